//! Recovery error types
//!
//! Only failures that cannot be salvaged surface here. A torn log tail is
//! handled inside recovery as a `PartialRecovery` condition, not an error.

use std::io;

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::wal::WalError;

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Errors that abort recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The log could not be opened or read for reasons other than tail
    /// corruption
    #[error("log unavailable during recovery: {0}")]
    Wal(#[from] WalError),

    /// The checkpoint directory could not be accessed
    #[error("checkpoint unavailable during recovery: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Filesystem access to the storage root failed
    #[error("recovery I/O failed: {0}")]
    Io(#[from] io::Error),
}
