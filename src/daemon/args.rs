use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::DEFAULT_RECONCILE_INTERVAL;

#[derive(Parser)]
#[command(name = "focusguard-daemon", version, about = "Keeps sites and apps blocked in the background")]
pub struct DaemonArgs {
    /// Run in the current process instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[arg(long = "hosts-file")]
    pub hosts_file: Option<PathBuf>,
    /// Seconds between two reconciliations.
    #[arg(long, default_value_t = DEFAULT_RECONCILE_INTERVAL.as_secs())]
    pub interval: u64,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
