//! OS specific locations and helpers.

use std::path::PathBuf;

use tracing::{debug, warn};

/// Return the system hosts file path.
pub fn hosts_file_path() -> PathBuf {
    if cfg!(windows) {
        let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".into());
        PathBuf::from(root).join(r"System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// Flush the OS DNS cache so hosts-file changes take effect immediately. Best effort.
pub fn flush_dns() {
    if !cfg!(windows) {
        return;
    }
    match std::process::Command::new("ipconfig")
        .arg("/flushdns")
        .output()
    {
        Ok(output) if output.status.success() => debug!("Flushed DNS cache"),
        Ok(output) => warn!("ipconfig /flushdns exited with {}", output.status),
        Err(e) => warn!("Failed to run ipconfig /flushdns {e:?}"),
    }
}
