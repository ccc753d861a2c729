//! Registers the daemon in the Windows Task Scheduler, so blocking resumes at every logon with
//! administrator rights and without a UAC prompt.

use std::{
    env,
    ffi::OsString,
    path::Path,
    process::{Command, Output},
};

use anyhow::Result;
use clap::Subcommand;
use tracing::{debug, info};

use crate::error::BlockerError;

use super::daemon_path::to_daemon_path;

pub const TASK_NAME: &str = "FocusGuard";
/// Gives the network a moment after logon.
const LOGON_DELAY: &str = "0000:15";

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum AutostartCommand {
    #[command(about = "Run the daemon at logon with highest privileges")]
    Install,
    #[command(about = "Remove the scheduled task")]
    Uninstall,
    #[command(about = "Show whether the scheduled task exists")]
    Status,
}

fn task_command_line(daemon: &Path, config_dir: &Path) -> String {
    format!(
        "\"{}\" --force --dir \"{}\"",
        daemon.display(),
        config_dir.display()
    )
}

fn create_args(daemon: &Path, config_dir: &Path) -> Vec<OsString> {
    let command_line = task_command_line(daemon, config_dir);
    [
        "/Create",
        "/TN",
        TASK_NAME,
        "/TR",
        command_line.as_str(),
        "/SC",
        "ONLOGON",
        "/RL",
        "HIGHEST",
        "/DELAY",
        LOGON_DELAY,
        "/F",
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

fn delete_args() -> Vec<OsString> {
    ["/Delete", "/TN", TASK_NAME, "/F"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

fn query_args() -> Vec<OsString> {
    ["/Query", "/TN", TASK_NAME]
        .into_iter()
        .map(OsString::from)
        .collect()
}

fn schtasks(args: &[OsString]) -> Result<Output, BlockerError> {
    debug!("Running schtasks {args:?}");
    Command::new("schtasks")
        .args(args)
        .output()
        .map_err(|e| BlockerError::io("running schtasks", e))
}

fn failure(action: &str, output: &Output) -> BlockerError {
    let message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    let source = std::io::Error::other(if message.is_empty() {
        format!("schtasks exited with {}", output.status)
    } else {
        message
    });
    if source.to_string().to_lowercase().contains("access is denied") {
        BlockerError::Permission {
            action: action.to_owned(),
            source,
        }
    } else {
        BlockerError::Io {
            action: action.to_owned(),
            source,
        }
    }
}

pub fn process_autostart_command(command: AutostartCommand, config_dir: &Path) -> Result<()> {
    if !cfg!(windows) {
        return Err(BlockerError::Unsupported("autostart through the Task Scheduler").into());
    }

    match command {
        AutostartCommand::Install => {
            let daemon = to_daemon_path(env::current_exe()?);
            // A previous registration may point to an old location.
            let _ = schtasks(&delete_args())?;
            let output = schtasks(&create_args(&daemon, config_dir))?;
            if !output.status.success() {
                return Err(failure("creating the scheduled task", &output).into());
            }
            info!("Registered scheduled task {TASK_NAME}");
            println!("Added to Windows startup (Task Scheduler).");
            println!("Task name: {TASK_NAME}");
            println!("Command:   {}", task_command_line(&daemon, config_dir));
            println!("The blocker will run with admin rights when you log in.");
        }
        AutostartCommand::Uninstall => {
            let output = schtasks(&delete_args())?;
            if output.status.success() {
                info!("Removed scheduled task {TASK_NAME}");
                println!("Removed from Task Scheduler.");
            } else {
                println!("focusguard was not in startup.");
            }
        }
        AutostartCommand::Status => {
            let output = schtasks(&query_args())?;
            if output.status.success() {
                println!("Task Scheduler: ACTIVE (task '{TASK_NAME}')");
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|line| line.contains(TASK_NAME))
                    .for_each(|line| println!("  {line}"));
            } else {
                println!("Task Scheduler: not configured");
            }
        }
    }
    Ok(())
}
