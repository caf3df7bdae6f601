//! Durable log subsystem
//!
//! Append-only log that makes every acknowledged write crash-durable.
//!
//! # Guarantees
//!
//! - Every append is fsynced before the sequence number is returned;
//!   acknowledgment implies durability
//! - Records carry strictly increasing sequence numbers, never reused
//! - Replay reproduces records in exact append order
//!
//! # Record Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────┬─────┬─────────┬───────┬──────────┐
//! │ len (u32)│ type (u8)│ seq (u64)│ klen u32│ key │ vlen u32│ value │ crc (u32)│
//! └──────────┴──────────┴──────────┴─────────┴─────┴─────────┴───────┴──────────┘
//! ```
//!
//! All integers are little-endian. `len` counts the whole record including
//! itself. The checksum covers every byte between `len` and `crc`.
//!
//! # Tail Corruption
//!
//! A record that was only partially written before a crash fails length or
//! checksum validation. The reader stops at the last verifiably complete
//! record and reports the corruption together with the byte length of the
//! valid prefix; the recovery layer salvages up to that point instead of
//! refusing to start.

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{WalError, WalResult};
pub use reader::LogReader;
pub use record::{LogRecord, RecordType, MIN_RECORD_SIZE};
pub use writer::LogWriter;

use std::path::{Path, PathBuf};

/// Active log file name inside the logs directory.
pub const LOG_FILE_NAME: &str = "store.wal";

/// Returns the path of the active log file inside `logs_dir`.
pub fn log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(LOG_FILE_NAME)
}
