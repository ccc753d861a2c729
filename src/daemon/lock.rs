use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::{error, info, warn};

use crate::{blocking::processes::ProcessTable, error::BlockerError};

/// What the lock file says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock file.
    Free,
    /// The lock file points to a live process.
    Held { pid: u32 },
    /// The lock file points to a dead process or can't be parsed.
    Stale { pid: Option<u32> },
}

/// Reads the lock file and checks whether its owner is still alive.
pub fn inspect(path: &Path, table: &mut dyn ProcessTable) -> Result<LockState, BlockerError> {
    Ok(match read_lock(path)? {
        Some(content) => classify(&content, table),
        None => LockState::Free,
    })
}

fn read_lock(path: &Path) -> Result<Option<String>, BlockerError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BlockerError::io(format!("reading lock file {path:?}"), e)),
    }
}

fn classify(content: &str, table: &mut dyn ProcessTable) -> LockState {
    match content.trim().parse::<u32>() {
        Ok(pid) if table.is_alive(pid) => LockState::Held { pid },
        Ok(pid) => LockState::Stale { pid: Some(pid) },
        Err(_) => LockState::Stale { pid: None },
    }
}

/// Removes a stale lock only if it still holds `stale`. The file is first moved aside, so a
/// lock written by a concurrent starter in the meantime is put back instead of deleted.
/// Returns whether the stale lock was removed.
fn remove_stale_lock(path: &Path, stale: &str, pid: u32) -> Result<bool, BlockerError> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".{pid}.stale"));
    let aside = PathBuf::from(aside);

    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(BlockerError::io(format!("moving lock file {path:?}"), e)),
    }

    let moved = fs::read_to_string(&aside)
        .map_err(|e| BlockerError::io(format!("reading lock file {aside:?}"), e))?;
    let removed = moved == stale;
    if !removed {
        warn!("Lock {path:?} changed while being reclaimed, putting it back");
        restore_lock(path, &moved);
    }
    remove_lock(&aside)?;
    Ok(removed)
}

fn restore_lock(path: &Path, content: &str) {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(content.as_bytes()) {
                error!("Failed to restore daemon lock {path:?} {e:?}");
            }
        }
        // Yet another starter took the lock, it is the owner now.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => error!("Failed to restore daemon lock {path:?} {e:?}"),
    }
}

/// Deletes the lock file. A missing file is fine.
pub fn remove_lock(path: &Path) -> Result<(), BlockerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BlockerError::io(format!("removing lock file {path:?}"), e)),
    }
}

/// Proof that this process is the only running daemon. The lock file is removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    pid: u32,
}

impl DaemonLock {
    /// Takes the lock for the current process, reclaiming a stale one.
    pub fn acquire(path: &Path, table: &mut dyn ProcessTable) -> Result<Self, BlockerError> {
        Self::acquire_as(path, std::process::id(), table)
    }

    fn acquire_as(
        path: &Path,
        pid: u32,
        table: &mut dyn ProcessTable,
    ) -> Result<Self, BlockerError> {
        const ATTEMPTS: usize = 3;

        for _ in 0..ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    write!(file, "{pid}")
                        .and_then(|_| file.sync_all())
                        .map_err(|e| BlockerError::io(format!("writing lock file {path:?}"), e))?;
                    info!("Acquired daemon lock {path:?} for pid {pid}");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let Some(content) = read_lock(path)? else {
                        continue;
                    };
                    match classify(&content, table) {
                        LockState::Held { pid: holder } if holder != pid => {
                            return Err(BlockerError::AlreadyRunning { pid: holder });
                        }
                        state => {
                            warn!("Reclaiming daemon lock {path:?} in state {state:?}");
                            remove_stale_lock(path, &content, pid)?;
                        }
                    }
                }
                Err(e) => {
                    return Err(BlockerError::io(format!("creating lock file {path:?}"), e));
                }
            }
        }

        Err(BlockerError::io(
            format!("creating lock file {path:?}"),
            io::Error::new(ErrorKind::AlreadyExists, "lock file keeps reappearing"),
        ))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        // Someone may have reclaimed the lock in the meantime, only remove our own.
        let ours = fs::read_to_string(&self.path)
            .is_ok_and(|content| content.trim() == self.pid.to_string());
        if ours {
            if let Err(e) = remove_lock(&self.path) {
                error!("Failed to release daemon lock {e:?}");
            }
        }
    }
}
