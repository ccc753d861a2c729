use std::{env, io, path::Path, process::Stdio, time::Duration};

use anyhow::Result;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    blocking::processes::ProcessTable,
    daemon::lock::{inspect, remove_lock, LockState},
    error::BlockerError,
    utils::dir::AppPaths,
};

use super::daemon_path::to_daemon_path;

/// How long `stop` waits for the daemon before escalating.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// The lock pointed to a process that was already gone.
    StaleLockRemoved { pid: Option<u32> },
    Stopped { pid: u32 },
}

async fn wait_for_exit(table: &mut dyn ProcessTable, pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !table.is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Stops the daemon recorded in the lock file and removes the lock once it's gone.
pub async fn stop_daemon(
    lock_path: &Path,
    table: &mut dyn ProcessTable,
    grace_period: Duration,
) -> Result<StopOutcome, BlockerError> {
    let pid = match inspect(lock_path, table)? {
        LockState::Free => return Ok(StopOutcome::NotRunning),
        LockState::Stale { pid } => {
            remove_lock(lock_path)?;
            info!("Removed stale daemon lock of pid {pid:?}");
            return Ok(StopOutcome::StaleLockRemoved { pid });
        }
        LockState::Held { pid } => pid,
    };

    if let Err(reason) = table.terminate(pid, false) {
        warn!("Polite termination of daemon {pid} failed: {reason}");
    }
    if !wait_for_exit(table, pid, grace_period).await {
        warn!("Daemon {pid} ignored termination, killing it");
        if let Err(reason) = table.terminate(pid, true) {
            warn!("Forced termination of daemon {pid} failed: {reason}");
        }
        if !wait_for_exit(table, pid, grace_period).await {
            return Err(BlockerError::io(
                format!("stopping daemon {pid}"),
                io::Error::other("the process is still alive"),
            ));
        }
    }

    remove_lock(lock_path)?;
    info!("Stopped daemon {pid}");
    Ok(StopOutcome::Stopped { pid })
}

/// Spawns the daemon executable as a detached background process.
pub fn spawn_detached_daemon(paths: &AppPaths, interval: Duration) -> Result<()> {
    let process_name = to_daemon_path(env::current_exe()?);
    let mut command = std::process::Command::new(&process_name);
    command
        .arg("--force")
        .arg("--dir")
        .arg(&paths.dir)
        .arg("--hosts-file")
        .arg(&paths.hosts)
        .arg("--interval")
        .arg(interval.as_secs().to_string());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    info!("Spawning {process_name:?}");
    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    println!("Started daemon with pid {}", child.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::Result;
    use mockall::predicate::eq;
    use tempfile::tempdir;

    use crate::blocking::processes::MockProcessTable;

    use super::{stop_daemon, StopOutcome};

    #[tokio::test]
    async fn stop_without_lock_is_a_noop() -> Result<()> {
        let dir = tempdir()?;
        let outcome = stop_daemon(
            &dir.path().join("focusguard.lock"),
            &mut MockProcessTable::new(),
            Duration::from_millis(10),
        )
        .await?;
        assert_eq!(outcome, StopOutcome::NotRunning);
        Ok(())
    }

    #[tokio::test]
    async fn stale_lock_is_removed_immediately() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("focusguard.lock");
        std::fs::write(&path, "77")?;

        let mut table = MockProcessTable::new();
        table.expect_is_alive().with(eq(77)).returning(|_| false);
        table.expect_terminate().never();

        let outcome = stop_daemon(&path, &mut table, Duration::from_millis(10)).await?;
        assert_eq!(outcome, StopOutcome::StaleLockRemoved { pid: Some(77) });
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn live_daemon_is_terminated_then_unlocked() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("focusguard.lock");
        std::fs::write(&path, "77")?;

        let terminated = Arc::new(AtomicBool::new(false));
        let mut table = MockProcessTable::new();
        let alive = terminated.clone();
        table
            .expect_is_alive()
            .with(eq(77))
            .returning(move |_| !alive.load(Ordering::SeqCst));
        table
            .expect_terminate()
            .with(eq(77), eq(false))
            .times(1)
            .returning(move |_, _| {
                terminated.store(true, Ordering::SeqCst);
                Ok(())
            });

        let outcome = stop_daemon(&path, &mut table, Duration::from_secs(1)).await?;
        assert_eq!(outcome, StopOutcome::Stopped { pid: 77 });
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_daemon_is_killed() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("focusguard.lock");
        std::fs::write(&path, "77")?;

        let killed = Arc::new(AtomicBool::new(false));
        let mut table = MockProcessTable::new();
        let alive = killed.clone();
        table
            .expect_is_alive()
            .returning(move |_| !alive.load(Ordering::SeqCst));
        table
            .expect_terminate()
            .with(eq(77), eq(false))
            .returning(|_, _| Ok(()));
        table
            .expect_terminate()
            .with(eq(77), eq(true))
            .times(1)
            .returning(move |_, _| {
                killed.store(true, Ordering::SeqCst);
                Ok(())
            });

        let outcome = stop_daemon(&path, &mut table, Duration::from_secs(1)).await?;
        assert_eq!(outcome, StopOutcome::Stopped { pid: 77 });
        Ok(())
    }
}
