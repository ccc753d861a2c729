use std::path::PathBuf;

/// Maps the path of the cli executable to the daemon executable next to it.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("focusguard-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::to_daemon_path;

    #[test]
    fn daemon_sits_next_to_cli() {
        let cli = PathBuf::from("bin").join(if cfg!(windows) { "focusguard.exe" } else { "focusguard" });
        let daemon = to_daemon_path(cli);
        assert_eq!(daemon.parent(), Some(PathBuf::from("bin").as_path()));
        assert!(daemon
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("focusguard-daemon")));
    }
}
