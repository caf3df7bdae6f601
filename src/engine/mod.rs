//! Storage engine
//!
//! Serves point operations against the in-memory map and routes every
//! mutation through the durable log before it becomes visible.
//!
//! # Concurrency Model
//!
//! - Mutations (`set`/`delete`) are serialized by `write_lock`: the log
//!   append order and the map apply order are therefore identical, and no
//!   update to a key can be lost
//! - Reads take only the map read lock and never block on log I/O
//! - Checkpoint capture clones the slot table under a short read lock;
//!   serialization and disk writes happen on already-copied data. Whole
//!   checkpoints are serialized by `checkpoint_lock` so the background loop
//!   and the shutdown flush never write artifacts concurrently
//!
//! # Failure Semantics
//!
//! The map is only touched after the log append succeeds, so memory and the
//! durable log never diverge: a failed append leaves the key at its previous
//! committed value and reports `WriteFailure` to the caller.

mod errors;
mod state;
mod tier;

pub use errors::{EngineError, EngineResult};
pub use state::{EngineState, StateCell};
pub use tier::{OverflowStore, ValueRef};

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tracing::{error, info};

use crate::checkpoint::{CheckpointManifest, CheckpointStore, Snapshot};
use crate::config::StoreConfig;
use crate::recovery::{mark_clean_shutdown, RecoveryManager, RecoveryReport};
use crate::wal::{LogWriter, RecordType};

/// A stored value: resident bytes, or a pointer into the overflow tier.
#[derive(Debug, Clone)]
enum Slot {
    Resident(Vec<u8>),
    Spilled(ValueRef),
}

/// The storage engine.
///
/// Cheap to share: all public operations take `&self` and are safe to call
/// from many concurrent request handlers.
#[derive(Debug)]
pub struct StoreEngine {
    config: StoreConfig,
    state: StateCell,
    map: RwLock<HashMap<Vec<u8>, Slot>>,
    /// Durable log; `None` when disabled by config or unavailable (degraded)
    log: Option<Mutex<LogWriter>>,
    /// Overflow tier; `None` when tiered storage is disabled
    overflow: Option<OverflowStore>,
    checkpoints: CheckpointStore,
    /// Serializes mutations so log order and map order agree
    write_lock: Mutex<()>,
    /// Serializes checkpoint capture and artifact writes: the background
    /// loop and the shutdown flush must never write artifacts concurrently,
    /// and manifests must land in capture order
    checkpoint_lock: Mutex<()>,
    /// Highest sequence reflected in the map (mutation counter when the log
    /// is disabled); updated while holding the map write lock
    last_applied: AtomicU64,
    records_since_checkpoint: AtomicU64,
    checkpoint_requests: Notify,
    recovery_report: Option<RecoveryReport>,
}

impl StoreEngine {
    /// Opens the engine: brings up on-disk state, runs recovery, and becomes
    /// ready to serve.
    ///
    /// Blocking; run it on a blocking-capable task. On return the engine is
    /// `Ready`, or `Degraded` when the recovered map is serviceable but the
    /// durable log cannot be brought up (reads serve, writes are refused).
    pub fn open(config: StoreConfig) -> EngineResult<Arc<Self>> {
        let state = StateCell::new();
        info!(data_dir = %config.data_dir.display(), "initializing storage engine");

        fs::create_dir_all(&config.data_dir).map_err(EngineError::Io)?;
        let checkpoints = CheckpointStore::open(&config.checkpoints_dir())?;
        let overflow = if config.enable_tiered_storage {
            Some(OverflowStore::open(&config.overflow_dir()).map_err(EngineError::Io)?)
        } else {
            None
        };

        state.set(EngineState::Recovering);
        let (recovered, last_sequence, report) = if config.recover_on_start {
            let outcome = RecoveryManager::new(&config).recover(&checkpoints)?;
            (outcome.map, outcome.last_sequence, Some(outcome.report))
        } else {
            info!("recovery disabled, starting from an empty map");
            (Snapshot::new(), 0, None)
        };

        let mut slots = HashMap::with_capacity(recovered.len());
        for (key, value) in recovered {
            let slot = Self::spill(&overflow, &config, &value)?;
            slots.insert(key, slot);
        }

        let mut degraded = false;
        let log = if config.enable_wal {
            match LogWriter::open(&config.logs_dir()) {
                Ok(mut writer) => {
                    writer.ensure_sequence_above(last_sequence);
                    Some(Mutex::new(writer))
                }
                Err(e) => {
                    error!(error = %e, "durable log unavailable, entering degraded state");
                    degraded = true;
                    None
                }
            }
        } else {
            None
        };

        if degraded {
            state.set(EngineState::Degraded);
        } else {
            state.set(EngineState::Ready);
        }
        info!(state = state.get().as_str(), last_sequence, "storage engine up");

        Ok(Arc::new(Self {
            config,
            state,
            map: RwLock::new(slots),
            log,
            overflow,
            checkpoints,
            write_lock: Mutex::new(()),
            checkpoint_lock: Mutex::new(()),
            last_applied: AtomicU64::new(last_sequence),
            records_since_checkpoint: AtomicU64::new(0),
            checkpoint_requests: Notify::new(),
            recovery_report: report,
        }))
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Report from startup recovery, if recovery ran.
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery_report.as_ref()
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.map.read().len()
    }

    /// Configuration the engine was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reads the value for a key. Never blocks on log I/O.
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let slot = self.map.read().get(key).cloned();
        match slot {
            None => Ok(None),
            Some(slot) => self.resolve(slot).map(Some),
        }
    }

    /// Stores a value under a key; overwrites atomically from the
    /// perspective of concurrent readers.
    ///
    /// Returns only after the record is durable in the log (when the log is
    /// enabled). `Ok` implies durability.
    pub fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        if self.state.get() == EngineState::Degraded {
            return Err(EngineError::Degraded);
        }
        let _write_guard = self.write_lock.lock();

        // Spill before the append: orphaned overflow bytes are harmless if
        // the append fails, whereas a durable record must always be applied.
        let slot = Self::spill(&self.overflow, &self.config, value)?;

        let sequence = match &self.log {
            Some(log) => log.lock().append(RecordType::Set, key, value)?,
            None => self.last_applied.load(Ordering::Acquire) + 1,
        };

        {
            let mut map = self.map.write();
            map.insert(key.to_vec(), slot);
            self.last_applied.store(sequence, Ordering::Release);
        }
        self.note_applied();
        Ok(())
    }

    /// Removes a key. Returns whether it was present.
    pub fn delete(&self, key: &[u8]) -> EngineResult<bool> {
        if self.state.get() == EngineState::Degraded {
            return Err(EngineError::Degraded);
        }
        let _write_guard = self.write_lock.lock();

        let sequence = match &self.log {
            Some(log) => log.lock().append(RecordType::Delete, key, &[])?,
            None => self.last_applied.load(Ordering::Acquire) + 1,
        };

        let removed = {
            let mut map = self.map.write();
            let removed = map.remove(key).is_some();
            self.last_applied.store(sequence, Ordering::Release);
            removed
        };
        self.note_applied();
        Ok(removed)
    }

    /// Requests a background checkpoint at the next opportunity.
    pub fn request_checkpoint(&self) {
        self.checkpoint_requests.notify_one();
    }

    /// Takes a checkpoint of the current map state synchronously.
    ///
    /// The critical section is a clone of the slot table under the read
    /// lock; materializing spilled values and writing the snapshot happen
    /// outside the map lock. Capture and artifact writes hold
    /// `checkpoint_lock` end to end, so a checkpoint taken later always
    /// writes its manifest later.
    pub fn checkpoint_now(&self) -> EngineResult<CheckpointManifest> {
        let _checkpoint_guard = self.checkpoint_lock.lock();
        let (slots, sequence) = {
            let map = self.map.read();
            (map.clone(), self.last_applied.load(Ordering::Acquire))
        };

        let mut snapshot = Snapshot::with_capacity(slots.len());
        for (key, slot) in slots {
            let value = self.resolve(slot)?;
            snapshot.insert(key, value);
        }

        let manifest = self.checkpoints.write(&snapshot, sequence)?;
        self.records_since_checkpoint.store(0, Ordering::Release);
        Ok(manifest)
    }

    /// Final flush on the graceful shutdown path: quiesce mutations, take a
    /// checkpoint, truncate the now-redundant log, write the clean-shutdown
    /// marker.
    pub fn flush_for_shutdown(&self) -> EngineResult<()> {
        let _write_guard = self.write_lock.lock();
        self.checkpoint_now()?;
        if let Some(log) = &self.log {
            log.lock().truncate()?;
        }
        mark_clean_shutdown(&self.config.data_dir)?;
        info!("final checkpoint and log truncate complete");
        Ok(())
    }

    /// Background run loop: serves checkpoint requests, honoring the
    /// configured flush-delay throttle, until shutdown is signaled.
    ///
    /// With the throttle disabled, checkpoints run as fast as the engine
    /// requests them.
    pub async fn run_checkpoint_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = self.checkpoint_requests.notified() => {}
                _ = shutdown.changed() => return,
            }

            let engine = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || engine.checkpoint_now()).await {
                Ok(Ok(manifest)) => {
                    info!(
                        last_sequence = manifest.last_sequence,
                        entries = manifest.entry_count,
                        "background checkpoint complete"
                    );
                }
                Ok(Err(e)) => {
                    // The previous checkpoint and the log remain valid
                    error!(error = %e, "background checkpoint failed");
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return,
            }

            if let Some(delay) = self.config.checkpoint_flush_delay() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Counts one applied record and requests a checkpoint when the interval
    /// is reached.
    fn note_applied(&self) {
        let applied = self.records_since_checkpoint.fetch_add(1, Ordering::AcqRel) + 1;
        if applied >= self.config.checkpoint_interval_records {
            self.checkpoint_requests.notify_one();
        }
    }

    /// Materializes a slot into value bytes.
    fn resolve(&self, slot: Slot) -> EngineResult<Vec<u8>> {
        match slot {
            Slot::Resident(value) => Ok(value),
            Slot::Spilled(value_ref) => match &self.overflow {
                Some(store) => store.read(value_ref).map_err(EngineError::Io),
                None => Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "spilled value but tiered storage is disabled",
                ))),
            },
        }
    }

    /// Chooses resident vs. spilled placement for a value.
    fn spill(
        overflow: &Option<OverflowStore>,
        config: &StoreConfig,
        value: &[u8],
    ) -> EngineResult<Slot> {
        match overflow {
            Some(store) if value.len() >= config.overflow_value_threshold => Ok(Slot::Spilled(
                store.append(value).map_err(EngineError::Io)?,
            )),
            _ => Ok(Slot::Resident(value.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_engine(config: StoreConfig) -> Arc<StoreEngine> {
        StoreEngine::open(config).unwrap()
    }

    #[test]
    fn read_after_write_returns_written_value() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(StoreConfig::at(dir.path()));

        engine.set(b"1", br#"{"id":1,"name":"pen"}"#).unwrap();
        assert_eq!(
            engine.get(b"1").unwrap(),
            Some(br#"{"id":1,"name":"pen"}"#.to_vec())
        );
    }

    #[test]
    fn overwrite_returns_latest_value() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(StoreConfig::at(dir.path()));

        engine.set(b"k", b"v1").unwrap();
        engine.set(b"k", b"v2").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn absent_key_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(StoreConfig::at(dir.path()));
        assert_eq!(engine.get(b"never-written").unwrap(), None);
    }

    #[test]
    fn delete_removes_key() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(StoreConfig::at(dir.path()));

        engine.set(b"k", b"v").unwrap();
        assert!(engine.delete(b"k").unwrap());
        assert_eq!(engine.get(b"k").unwrap(), None);
        assert!(!engine.delete(b"k").unwrap());
    }

    #[test]
    fn acknowledged_writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let engine = open_engine(StoreConfig::at(dir.path()));
            engine.set(b"1", b"pen").unwrap();
            engine.set(b"2", b"ink").unwrap();
            engine.delete(b"2").unwrap();
        }
        let engine = open_engine(StoreConfig::at(dir.path()));
        assert_eq!(engine.get(b"1").unwrap(), Some(b"pen".to_vec()));
        assert_eq!(engine.get(b"2").unwrap(), None);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn wal_disabled_acks_without_durability() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path());
        config.enable_wal = false;
        {
            let engine = open_engine(config.clone());
            engine.set(b"k", b"v").unwrap();
            assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
        }
        // No log, no checkpoint taken: nothing survives
        let engine = open_engine(config);
        assert_eq!(engine.get(b"k").unwrap(), None);
    }

    #[test]
    fn checkpoint_alone_restores_state_without_wal() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path());
        config.enable_wal = false;
        {
            let engine = open_engine(config.clone());
            engine.set(b"k", b"v").unwrap();
            engine.checkpoint_now().unwrap();
        }
        let engine = open_engine(config);
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn large_values_spill_and_read_through() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path());
        config.enable_tiered_storage = true;
        config.overflow_value_threshold = 8;
        let engine = open_engine(config);

        let big = vec![0xABu8; 64];
        engine.set(b"big", &big).unwrap();
        engine.set(b"small", b"tiny").unwrap();

        assert_eq!(engine.get(b"big").unwrap(), Some(big));
        assert_eq!(engine.get(b"small").unwrap(), Some(b"tiny".to_vec()));
        assert!(engine
            .config()
            .overflow_dir()
            .join("values.dat")
            .exists());
    }

    #[test]
    fn spilled_values_survive_reopen_via_log() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path());
        config.enable_tiered_storage = true;
        config.overflow_value_threshold = 8;

        let big = vec![0xCDu8; 128];
        {
            let engine = open_engine(config.clone());
            engine.set(b"big", &big).unwrap();
        }
        let engine = open_engine(config);
        assert_eq!(engine.get(b"big").unwrap(), Some(big));
    }

    #[test]
    fn recovery_disabled_starts_empty() {
        let dir = TempDir::new().unwrap();
        {
            let engine = open_engine(StoreConfig::at(dir.path()));
            engine.set(b"k", b"v").unwrap();
        }
        let mut config = StoreConfig::at(dir.path());
        config.recover_on_start = false;
        let engine = open_engine(config);
        assert_eq!(engine.get(b"k").unwrap(), None);
        assert!(engine.recovery_report().is_none());
    }

    #[test]
    fn checkpoint_records_current_position() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(StoreConfig::at(dir.path()));

        engine.set(b"a", b"1").unwrap();
        engine.set(b"b", b"2").unwrap();
        let manifest = engine.checkpoint_now().unwrap();
        assert_eq!(manifest.last_sequence, 2);
        assert_eq!(manifest.entry_count, 2);
    }
}
