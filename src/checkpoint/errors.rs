//! Checkpoint error types
//!
//! Checkpoint failures never terminate the process: a failed checkpoint
//! leaves the previous one valid and the log intact, so the engine logs the
//! error and retries on the next trigger.

use std::io;

use thiserror::Error;

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors produced by the checkpoint subsystem.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Reading or writing a checkpoint artifact failed
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The manifest could not be serialized or parsed
    #[error("checkpoint manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// A snapshot body failed structural or checksum validation
    #[error("checkpoint corrupt: {0}")]
    Corrupt(String),
}

impl CheckpointError {
    /// Create a corruption error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        CheckpointError::Corrupt(reason.into())
    }
}
