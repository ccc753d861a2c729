//! Error types shared by the blocking engine, the daemon and the cli.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures of the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid entry {0:?}")]
    InvalidEntry(String),
}

impl ConfigError {
    pub fn exit_code(&self) -> u8 {
        3
    }
}

/// A single process that could not be terminated. Never aborts a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to terminate {name} (pid {pid}): {reason}")]
pub struct ProcessKillError {
    pub pid: u32,
    pub name: String,
    pub reason: String,
}

/// Main error type of blocking operations.
#[derive(Debug, Error)]
pub enum BlockerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("permission denied while {action}. Run this command from an elevated (administrator) prompt")]
    Permission {
        action: String,
        #[source]
        source: io::Error,
    },

    #[error("daemon is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },

    #[error("I/O error while {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl BlockerError {
    /// Wraps an I/O error, turning access denials into [BlockerError::Permission].
    pub fn io(action: impl Into<String>, source: io::Error) -> Self {
        let action = action.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission { action, source }
        } else {
            Self::Io { action, source }
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            BlockerError::Config(e) => e.exit_code(),
            BlockerError::Permission { .. } => 4,
            BlockerError::AlreadyRunning { .. } => 5,
            BlockerError::Io { .. } | BlockerError::Unsupported(_) => 1,
        }
    }
}
