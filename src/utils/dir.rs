use std::{
    env, io,
    path::{self, PathBuf},
};

use anyhow::{anyhow, Result};

use crate::config::CONFIG_FILE_NAME;

use super::platform::hosts_file_path;

const APPLICATION_DIR_NAME: &str = "focusguard";
pub const LOCK_FILE_NAME: &str = "focusguard.lock";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = env::var("APPDATA")
                .map(PathBuf::from)
                .map_err(|_| anyhow!("APPDATA should be present on Windows"))?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
    };

    create_dir(path)
}

fn create_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// Every location the application reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub dir: PathBuf,
    pub config: PathBuf,
    /// Daemon lock file, kept next to the configuration.
    pub lock: PathBuf,
    pub logs: PathBuf,
    pub hosts: PathBuf,
}

impl AppPaths {
    pub fn new(dir: PathBuf, hosts: PathBuf) -> Self {
        Self {
            config: dir.join(CONFIG_FILE_NAME),
            lock: dir.join(LOCK_FILE_NAME),
            logs: dir.join("logs"),
            hosts,
            dir,
        }
    }

    /// Resolves overrides from the command line, falling back to the default locations.
    /// Returned paths are absolute, so they survive the daemon changing its working directory
    /// and can be handed to a detached process.
    pub fn resolve(dir: Option<PathBuf>, hosts: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => create_dir(path::absolute(dir)?)?,
            None => create_application_default_path()?,
        };
        let hosts = path::absolute(hosts.unwrap_or_else(hosts_file_path))?;
        Ok(Self::new(dir, hosts))
    }
}
