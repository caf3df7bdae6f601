//! Engine error types
//!
//! A `set` that cannot be durably appended is reported as `WriteFailure`;
//! memory and the durable log never diverge because the map is only touched
//! after the append succeeds.

use std::io;

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::recovery::RecoveryError;
use crate::wal::WalError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The durable append failed; the mutation is not committed and the
    /// in-memory map is untouched
    #[error("write failure: {0}")]
    WriteFailure(#[from] WalError),

    /// The engine is degraded after unrecoverable log/checkpoint corruption;
    /// writes are rejected, reads may still serve recovered state
    #[error("store is degraded: writes are rejected")]
    Degraded,

    /// Storage I/O outside the log failed (directory setup, overflow tier)
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Startup recovery failed outright
    #[error("recovery failed: {0}")]
    Recovery(#[from] RecoveryError),

    /// The checkpoint directory could not be brought up or written
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}
