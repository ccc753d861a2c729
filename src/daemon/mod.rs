use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    blocking::{
        enforcer::{Enforcer, ReconcileReport},
        processes::SysinfoProcessTable,
    },
    config::ConfigStore,
    utils::{
        clock::{Clock, DefaultClock},
        dir::AppPaths,
    },
};

pub mod args;
pub mod lock;
pub mod shutdown;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Represents the starting point for the daemon. Fails with
/// [AlreadyRunning](crate::error::BlockerError::AlreadyRunning) when another daemon holds the
/// lock.
pub async fn start_daemon(paths: AppPaths, interval: Duration) -> Result<()> {
    let lock = lock::DaemonLock::acquire(&paths.lock, &mut SysinfoProcessTable::new())?;
    std::env::set_current_dir(&paths.dir)?;

    let shutdown_token = CancellationToken::new();
    let daemon = create_daemon(
        &paths,
        Enforcer::for_system(paths.hosts.clone()),
        &shutdown_token,
        interval,
        DefaultClock,
    );

    info!(
        "Daemon {} started, reconciling every {}s",
        lock.pid(),
        interval.as_secs()
    );
    let (_, result) = tokio::join!(shutdown::detect_shutdown(shutdown_token), daemon.run());

    drop(lock);
    result
}

fn create_daemon(
    paths: &AppPaths,
    enforcer: Enforcer,
    shutdown_token: &CancellationToken,
    interval: Duration,
    clock: impl Clock,
) -> EnforcementDaemon {
    EnforcementDaemon::new(
        ConfigStore::new(paths.config.clone()),
        enforcer,
        shutdown_token.clone(),
        interval,
        Box::new(clock),
    )
}

/// Re-applies the configuration at a fixed interval until cancelled.
pub struct EnforcementDaemon {
    store: ConfigStore,
    enforcer: Enforcer,
    shutdown: CancellationToken,
    interval: Duration,
    clock: Box<dyn Clock>,
}

impl EnforcementDaemon {
    pub fn new(
        store: ConfigStore,
        enforcer: Enforcer,
        shutdown: CancellationToken,
        interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            store,
            enforcer,
            shutdown,
            interval,
            clock,
        }
    }

    /// Reloads the configuration and reconciles once. Failures are logged, the next tick tries
    /// again.
    pub async fn tick(&mut self) -> Option<ReconcileReport> {
        let config = match self.store.load().await {
            Ok(config) => config,
            Err(e) => {
                error!("Skipping reconciliation, configuration can't be loaded {e:?}");
                return None;
            }
        };

        let report = self.enforcer.reconcile(&config).await;
        for failure in &report.failures {
            warn!("Reconciliation step failed {failure}");
        }
        if !report.kills.killed.is_empty() {
            info!("Killed {} blocked app(s)", report.kills.killed.len());
        }
        Some(report)
    }

    /// Executes the daemon event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut reconcile_point = self.clock.instant();
        loop {
            reconcile_point += self.interval;

            self.tick().await;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Daemon shutting down");
                    return Ok(())
                }
                _ = self.clock.sleep_until(reconcile_point) => ()
            }
        }
    }
}
