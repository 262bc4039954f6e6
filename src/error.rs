//! Run-aborting errors
//!
//! Per-record anomalies (malformed lines, unmatched syscalls, unresolved
//! descriptors) never surface here; they are counted in the run statistics.
//! Only failures that leave no meaningful partial result are errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Trace stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Malformed descriptor snapshot: {0}")]
    SnapshotFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse stage terminated unexpectedly")]
    StageDisconnected,

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TraceError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TraceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, TraceError>;
