//! Startup recovery
//!
//! Rebuilds the in-memory map from the newest valid checkpoint plus every
//! log record appended after the checkpoint's position, in order.
//!
//! # Sequence (strict order)
//!
//! 1. Check and clear the clean-shutdown marker
//! 2. Load the newest valid checkpoint (missing or corrupt ⇒ empty base,
//!    replay from the beginning of the log)
//! 3. Replay log records with sequence above the checkpoint position
//! 4. On tail corruption, stop at the last verifiably complete record and
//!    report `PartialRecovery`; data past that point is lost but the store
//!    becomes usable
//!
//! Replaying the salvaged records onto the checkpoint state reproduces the
//! exact committed map; within a key, the last record by log order wins.

mod errors;

pub use errors::{RecoveryError, RecoveryResult};

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, Snapshot};
use crate::config::StoreConfig;
use crate::wal::{log_path, LogReader, RecordType, WalError};

/// Clean shutdown marker filename inside the storage root.
const CLEAN_SHUTDOWN_MARKER: &str = "clean_shutdown";

/// Recovery stopped early at a corrupt or truncated tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecovery {
    /// Byte offset where the valid log prefix ends
    pub valid_offset: u64,
    /// What the reader found past that offset
    pub reason: String,
}

impl fmt::Display for PartialRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "log salvaged up to offset {}: {}",
            self.valid_offset, self.reason
        )
    }
}

/// Statistics from one recovery run.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Log position of the checkpoint base, if one was used
    pub checkpoint_sequence: Option<u64>,
    /// Records replayed on top of the base
    pub records_replayed: u64,
    /// Records skipped because the checkpoint already covered them
    pub records_skipped: u64,
    /// Present when replay stopped at a corrupt tail
    pub partial: Option<PartialRecovery>,
    /// Whether the previous process exited through the shutdown path
    pub was_clean_shutdown: bool,
}

/// Outcome of recovery: the rebuilt map and where the log left off.
pub struct RecoveredState {
    /// Rebuilt key-value map
    pub map: Snapshot,
    /// Highest sequence number reflected in the map
    pub last_sequence: u64,
    /// What happened along the way
    pub report: RecoveryReport,
}

/// Orchestrates the startup recovery sequence.
pub struct RecoveryManager<'a> {
    config: &'a StoreConfig,
}

impl<'a> RecoveryManager<'a> {
    /// Creates a recovery manager for the given configuration.
    pub fn new(config: &'a StoreConfig) -> Self {
        Self { config }
    }

    /// Runs the full recovery sequence.
    pub fn recover(&self, checkpoints: &CheckpointStore) -> RecoveryResult<RecoveredState> {
        let was_clean_shutdown = self.take_shutdown_marker()?;

        // Step 2: checkpoint base, or empty map
        let (mut map, checkpoint_sequence) = match checkpoints.load_latest()? {
            Some((snapshot, manifest)) => {
                info!(
                    last_sequence = manifest.last_sequence,
                    entries = manifest.entry_count,
                    "recovering from checkpoint"
                );
                (snapshot, Some(manifest.last_sequence))
            }
            None => (Snapshot::new(), None),
        };
        let base_sequence = checkpoint_sequence.unwrap_or(0);
        let mut last_sequence = base_sequence;

        // Step 3: replay the log past the checkpoint position
        let mut records_replayed = 0u64;
        let mut records_skipped = 0u64;
        let mut partial = None;

        if let Some(mut reader) = self.open_log()? {
            loop {
                match reader.read_next() {
                    Ok(Some(record)) => {
                        if record.sequence <= base_sequence {
                            records_skipped += 1;
                            continue;
                        }
                        match record.record_type {
                            RecordType::Set => {
                                map.insert(record.key, record.value);
                            }
                            RecordType::Delete => {
                                map.remove(&record.key);
                            }
                        }
                        last_sequence = record.sequence;
                        records_replayed += 1;
                    }
                    Ok(None) => break,
                    Err(WalError::Corruption { offset, reason }) => {
                        partial = Some(PartialRecovery {
                            valid_offset: offset,
                            reason,
                        });
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let report = RecoveryReport {
            checkpoint_sequence,
            records_replayed,
            records_skipped,
            partial,
            was_clean_shutdown,
        };

        if let Some(partial) = &report.partial {
            warn!(%partial, "partial recovery: continuing with salvaged state");
        }
        info!(
            records_replayed,
            records_skipped,
            last_sequence,
            was_clean_shutdown,
            "recovery complete"
        );

        Ok(RecoveredState {
            map,
            last_sequence,
            report,
        })
    }

    /// Opens the log for replay; a missing log file means nothing to replay.
    fn open_log(&self) -> RecoveryResult<Option<LogReader>> {
        let path = log_path(&self.config.logs_dir());
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(LogReader::open(&path)?))
    }

    /// Returns whether the marker was present, removing it either way.
    fn take_shutdown_marker(&self) -> RecoveryResult<bool> {
        let path = marker_path(&self.config.data_dir);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Path of the clean-shutdown marker inside the storage root.
pub fn marker_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join(CLEAN_SHUTDOWN_MARKER)
}

/// Writes the clean-shutdown marker. Called on the graceful exit path.
pub fn mark_clean_shutdown(data_dir: &Path) -> RecoveryResult<()> {
    fs::create_dir_all(data_dir)?;
    fs::write(marker_path(data_dir), b"")?;
    Ok(())
}
