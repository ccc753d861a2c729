use std::collections::BTreeSet;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

use crate::error::ProcessKillError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    /// Image name, for example `TikTok.exe`.
    pub name: String,
}

/// Intended to serve as a contract over the OS process table, so that killing logic can be
/// tested without real processes.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send {
    fn list(&mut self) -> Vec<RunningProcess>;

    fn is_alive(&mut self, pid: u32) -> bool;

    /// Asks a process to exit. `force` skips the polite signal where the platform has one.
    fn terminate(&mut self, pid: u32, force: bool) -> Result<(), String>;
}

/// [ProcessTable] backed by [sysinfo].
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn list(&mut self) -> Vec<RunningProcess> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .iter()
            .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
            .map(|(pid, process)| RunningProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect()
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        // A fresh snapshot, so a process that died since the last refresh isn't reported.
        let mut system = System::new();
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }

    fn terminate(&mut self, pid: u32, force: bool) -> Result<(), String> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| "process already exited".to_string())?;

        let signal = if force { Signal::Kill } else { Signal::Term };
        // On Windows every signal ends up as a forced TerminateProcess.
        let delivered = match process.kill_with(signal) {
            Some(delivered) => delivered,
            None => process.kill(),
        };
        if delivered {
            Ok(())
        } else {
            Err("the operating system refused to terminate the process".into())
        }
    }
}

/// Outcome of [kill_blocked]. Failures never abort the batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KillReport {
    pub killed: Vec<RunningProcess>,
    pub failed: Vec<ProcessKillError>,
}

impl KillReport {
    pub fn is_empty(&self) -> bool {
        self.killed.is_empty() && self.failed.is_empty()
    }
}

/// Force-terminates every process whose image name matches one of `app_names`, ignoring case.
pub fn kill_blocked(table: &mut dyn ProcessTable, app_names: &[String]) -> KillReport {
    let mut report = KillReport::default();
    if app_names.is_empty() {
        return report;
    }

    for process in table.list() {
        let blocked = app_names
            .iter()
            .any(|app| app.trim().eq_ignore_ascii_case(&process.name));
        if !blocked {
            continue;
        }

        match table.terminate(process.pid, true) {
            Ok(()) => {
                info!("Killed blocked app {} (pid {})", process.name, process.pid);
                report.killed.push(process);
            }
            Err(reason) => {
                let error = ProcessKillError {
                    pid: process.pid,
                    name: process.name,
                    reason,
                };
                warn!("{error}");
                report.failed.push(error);
            }
        }
    }
    report
}

/// Sorted, de-duplicated names of running executables.
pub fn list_running(table: &mut dyn ProcessTable) -> Vec<String> {
    table
        .list()
        .into_iter()
        .map(|process| process.name)
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use crate::error::ProcessKillError;

    use super::{kill_blocked, list_running, MockProcessTable, RunningProcess};

    fn running() -> Vec<RunningProcess> {
        vec![
            RunningProcess {
                pid: 10,
                name: "TikTok.exe".into(),
            },
            RunningProcess {
                pid: 11,
                name: "explorer.exe".into(),
            },
            RunningProcess {
                pid: 12,
                name: "tiktok.EXE".into(),
            },
            RunningProcess {
                pid: 13,
                name: "explorer.exe".into(),
            },
        ]
    }

    #[test]
    fn unknown_app_kills_nothing() {
        let mut table = MockProcessTable::new();
        table.expect_list().returning(running);
        table.expect_terminate().never();

        let report = kill_blocked(&mut table, &["ghost.exe".to_string()]);
        assert!(report.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut table = MockProcessTable::new();
        table.expect_list().returning(running);
        table
            .expect_terminate()
            .with(eq(10), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        table
            .expect_terminate()
            .with(eq(12), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));

        let report = kill_blocked(&mut table, &["TIKTOK.exe".to_string()]);
        let pids = report.killed.iter().map(|p| p.pid).collect::<Vec<_>>();
        assert_eq!(pids, vec![10, 12]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn failed_kill_does_not_abort_batch() {
        let mut table = MockProcessTable::new();
        table.expect_list().returning(running);
        table
            .expect_terminate()
            .with(eq(10), eq(true))
            .returning(|_, _| Err("access denied".into()));
        table
            .expect_terminate()
            .with(eq(12), eq(true))
            .returning(|_, _| Ok(()));

        let report = kill_blocked(&mut table, &["tiktok.exe".to_string()]);
        assert_eq!(report.killed.len(), 1);
        assert_eq!(
            report.failed,
            vec![ProcessKillError {
                pid: 10,
                name: "TikTok.exe".into(),
                reason: "access denied".into(),
            }]
        );
    }

    #[test]
    fn empty_block_list_skips_enumeration() {
        let mut table = MockProcessTable::new();
        table.expect_list().never();
        assert!(kill_blocked(&mut table, &[]).is_empty());
    }

    #[test]
    fn running_names_are_unique_and_sorted() {
        let mut table = MockProcessTable::new();
        table.expect_list().returning(running);
        assert_eq!(
            list_running(&mut table),
            vec!["TikTok.exe", "explorer.exe", "tiktok.EXE"]
        );
    }
}
