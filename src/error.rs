//! Error types for the monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the monitor.
///
/// None of these stop the process once it is running; each is logged where
/// it occurs and the affected operation is retried on its next schedule.
#[derive(Debug, Error)]
pub enum PingwatchError {
    /// The state file exists but could not be read or decoded.
    #[error("failed to read state file {path}: {reason}")]
    PersistenceRead { path: PathBuf, reason: String },

    /// The state file could not be written.
    #[error("failed to write state file {path}: {source}")]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A subscriber's channel is closed or full.
    #[error("subscriber {0} is not accepting events")]
    SinkDelivery(u64),

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A duration string could not be parsed.
    #[error("unknown duration format: {0}")]
    InvalidDuration(String),

    /// The probe process could not be started.
    #[error("failed to spawn probe for {target}: {source}")]
    ProbeSpawn {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure.
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PingwatchError {
    fn from(err: config::ConfigError) -> Self {
        PingwatchError::Config(err.to_string())
    }
}

/// Result alias for monitor operations.
pub type Result<T, E = PingwatchError> = std::result::Result<T, E>;
