use std::path::PathBuf;

use tracing::{error, warn};

use crate::{config::BlockConfig, error::BlockerError, utils::platform::flush_dns};

use super::{
    hosts::{HostsChange, HostsFile},
    policy::{system_policy_store, PolicyStore},
    processes::{kill_blocked, KillReport, ProcessTable, SysinfoProcessTable},
};

/// Result of one reconciliation. Every step runs even when an earlier one failed; failures are
/// collected in order.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub hosts: HostsChange,
    pub url_patterns: usize,
    pub kills: KillReport,
    pub overlapping_urls: Vec<String>,
    pub failures: Vec<BlockerError>,
}

impl ReconcileReport {
    /// Turns the report into an error when any step failed, surfacing the first failure.
    pub fn into_result(mut self) -> Result<Self, BlockerError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(self.failures.remove(0))
        }
    }
}

/// Makes the hosts file, browser policies and running processes match a [BlockConfig].
pub struct Enforcer {
    hosts: HostsFile,
    policy: Box<dyn PolicyStore>,
    processes: Box<dyn ProcessTable>,
    flush_dns: bool,
}

impl Enforcer {
    pub fn new(
        hosts: HostsFile,
        policy: Box<dyn PolicyStore>,
        processes: Box<dyn ProcessTable>,
    ) -> Self {
        Self {
            hosts,
            policy,
            processes,
            flush_dns: false,
        }
    }

    /// Enforcer operating on the real system: registry or managed policy files, sysinfo process
    /// table and DNS cache flushing.
    pub fn for_system(hosts_path: PathBuf) -> Self {
        let mut enforcer = Self::new(
            HostsFile::new(hosts_path),
            system_policy_store(),
            Box::new(SysinfoProcessTable::new()),
        );
        enforcer.flush_dns = true;
        enforcer
    }

    pub fn hosts(&self) -> &HostsFile {
        &self.hosts
    }

    pub fn policy(&self) -> &dyn PolicyStore {
        self.policy.as_ref()
    }

    pub fn processes(&mut self) -> &mut dyn ProcessTable {
        self.processes.as_mut()
    }

    pub async fn apply_sites(&mut self, sites: &[String]) -> Result<HostsChange, BlockerError> {
        let change = self.hosts.apply(sites).await?;
        if !change.is_empty() && self.flush_dns {
            flush_dns();
        }
        Ok(change)
    }

    pub fn apply_urls(&mut self, patterns: &[String]) -> Result<usize, BlockerError> {
        self.policy.apply(patterns)?;
        self.policy.current().map(|current| current.len())
    }

    pub fn kill_apps(&mut self, apps: &[String]) -> KillReport {
        kill_blocked(self.processes.as_mut(), apps)
    }

    /// Applies the whole configuration. Idempotent.
    #[tracing::instrument(skip_all)]
    pub async fn reconcile(&mut self, config: &BlockConfig) -> ReconcileReport {
        let mut report = ReconcileReport {
            overlapping_urls: config
                .overlapping_urls()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            ..Default::default()
        };
        for url in &report.overlapping_urls {
            warn!("{url} is also blocked through the hosts file, the whole domain stays unreachable");
        }

        match self.apply_sites(&config.blocked_sites).await {
            Ok(change) => report.hosts = change,
            Err(e) => {
                error!("Failed to apply hosts entries {e:?}");
                report.failures.push(e);
            }
        }

        match self.apply_urls(&config.blocked_urls) {
            Ok(count) => report.url_patterns = count,
            Err(e) => {
                error!("Failed to apply url policy {e:?}");
                report.failures.push(e);
            }
        }

        report.kills = self.kill_apps(&config.blocked_apps);
        report
    }

    /// Removes managed hosts entries and browser policies. Running apps are left alone.
    pub async fn unblock(&mut self) -> Result<usize, BlockerError> {
        let removed = self.hosts.remove_all().await?;
        if removed > 0 && self.flush_dns {
            flush_dns();
        }
        self.policy.remove_all()?;
        Ok(removed)
    }
}
