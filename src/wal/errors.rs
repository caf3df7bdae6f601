//! Log error types
//!
//! Two families:
//! - I/O failures (`Open`, `Append`, `Fsync`, `Truncate`): the storage write
//!   or read itself failed; the mutation that triggered it is not committed
//! - `Corruption`: a record failed length, checksum, or sequence validation;
//!   carries the offset where the valid prefix ends so recovery can salvage

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for log operations
pub type WalResult<T> = Result<T, WalError>;

/// Errors produced by the durable log.
#[derive(Debug, Error)]
pub enum WalError {
    /// The log file could not be opened or created
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record write failed; the record is not committed
    #[error("log append failed: {0}")]
    Append(#[source] io::Error),

    /// fsync failed; durability of the pending record cannot be guaranteed
    #[error("log fsync failed: {0}")]
    Fsync(#[source] io::Error),

    /// Truncating the log (after a checkpoint or torn tail) failed
    #[error("log truncate failed: {0}")]
    Truncate(#[source] io::Error),

    /// A record failed validation during replay
    #[error("log corruption at offset {offset}: {reason}")]
    Corruption {
        /// Byte offset where the last fully valid record ends
        offset: u64,
        reason: String,
    },
}

impl WalError {
    /// Create a corruption error at the given valid-prefix offset.
    pub fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        WalError::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns true if this error indicates record corruption rather than a
    /// live I/O failure.
    pub fn is_corruption(&self) -> bool {
        matches!(self, WalError::Corruption { .. })
    }
}
