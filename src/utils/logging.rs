use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

pub const CLI_PREFIX: &str = "cli";
pub const DAEMON_PREFIX: &str = "daemon";

/// Logs into daily rolling files under `logs_dir`, and into stdout when `show_std` is set.
pub fn enable_logging(
    prefix: &str,
    logs_dir: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(prefix)
        .build(logs_dir)?;

    let stdout = std::io::stdout.with_filter(move |_| show_std);

    let level = log_level.map(|v| v.to_string()).unwrap_or_else(|| {
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level(prefix).to_string())
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(crate_filter(&level)))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stdout.and(appender))
        .pretty()
        .init();
    Ok(())
}

/// The daemon keeps a record of every reconciliation, one-shot commands only log problems.
fn default_level(prefix: &str) -> LevelFilter {
    if prefix == DAEMON_PREFIX {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    }
}

fn crate_filter(level: &str) -> String {
    format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_"))
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::{crate_filter, default_level, CLI_PREFIX, DAEMON_PREFIX};

    #[test]
    fn cli_is_quieter_than_daemon() {
        assert_eq!(default_level(CLI_PREFIX), LevelFilter::WARN);
        assert_eq!(default_level(DAEMON_PREFIX), LevelFilter::INFO);
    }

    #[test]
    fn filter_targets_only_this_crate() {
        assert_eq!(crate_filter("info"), "focusguard=info");
    }
}
