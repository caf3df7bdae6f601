//! Checkpoint artifact storage
//!
//! Owns the checkpoints directory: writes snapshot bodies durably, loads the
//! newest valid checkpoint on startup, prunes superseded snapshots.
//!
//! # Snapshot Body Format
//!
//! ```text
//! ┌────────────────┬───────────────────────────────┬───────────┐
//! │ entry_count u64│ entries: klen,key,vlen,value… │ crc (u32) │
//! └────────────────┴───────────────────────────────┴───────────┘
//! ```
//!
//! Little-endian throughout. The checksum covers everything before it.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::wal::{compute_checksum, verify_checksum};

use super::errors::{CheckpointError, CheckpointResult};
use super::manifest::CheckpointManifest;

/// Key-value pairs captured by a snapshot.
pub type Snapshot = HashMap<Vec<u8>, Vec<u8>>;

/// Manages checkpoint artifacts under one directory.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Opens or creates the checkpoints directory.
    pub fn open(dir: &Path) -> CheckpointResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Writes a new checkpoint covering the log up to `last_sequence`.
    ///
    /// Follows the durable order documented in the module header. Returns
    /// the manifest once both snapshot and manifest are on stable storage.
    pub fn write(
        &self,
        snapshot: &Snapshot,
        last_sequence: u64,
    ) -> CheckpointResult<CheckpointManifest> {
        let file_name = format!("checkpoint_{:012}.ckpt", last_sequence);
        let final_path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!("{}.tmp", file_name));

        let body = Self::encode(snapshot);
        fs::write(&tmp_path, &body)?;
        File::open(&tmp_path)?.sync_all()?;
        fs::rename(&tmp_path, &final_path)?;

        let manifest = CheckpointManifest::new(&file_name, last_sequence, snapshot.len() as u64);
        manifest.write_to(&self.dir)?;

        self.prune(&file_name);

        info!(
            last_sequence,
            entries = snapshot.len(),
            file = %file_name,
            "checkpoint written"
        );
        Ok(manifest)
    }

    /// Loads the newest valid checkpoint.
    ///
    /// Returns `Ok(None)` when no checkpoint exists, and also when the
    /// manifest or snapshot turns out corrupt: a broken checkpoint falls
    /// back to full log replay rather than failing startup.
    pub fn load_latest(&self) -> CheckpointResult<Option<(Snapshot, CheckpointManifest)>> {
        let manifest = match CheckpointManifest::load_from(&self.dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "checkpoint manifest unreadable, falling back to log replay");
                return Ok(None);
            }
        };

        let path = self.dir.join(&manifest.snapshot_file);
        match fs::read(&path).map_err(CheckpointError::from).and_then(|body| {
            Self::decode(&body).and_then(|snapshot| {
                if snapshot.len() as u64 != manifest.entry_count {
                    Err(CheckpointError::corrupt(format!(
                        "snapshot has {} entries, manifest says {}",
                        snapshot.len(),
                        manifest.entry_count
                    )))
                } else {
                    Ok(snapshot)
                }
            })
        }) {
            Ok(snapshot) => Ok(Some((snapshot, manifest))),
            Err(e) => {
                warn!(
                    file = %manifest.snapshot_file,
                    error = %e,
                    "checkpoint snapshot invalid, falling back to log replay"
                );
                Ok(None)
            }
        }
    }

    /// Removes snapshot and temp files other than `keep`.
    ///
    /// Best effort: a leftover file is harmless because only the manifest
    /// decides which snapshot counts.
    fn prune(&self, keep: &str) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let superseded = (name.ends_with(".ckpt") && name != keep) || name.ends_with(".tmp");
            if superseded {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(file = %name, error = %e, "failed to prune old checkpoint");
                }
            }
        }
    }

    fn encode(snapshot: &Snapshot) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(snapshot.len() as u64).to_le_bytes());
        for (key, value) in snapshot {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(value);
        }
        let crc = compute_checksum(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(body: &[u8]) -> CheckpointResult<Snapshot> {
        if body.len() < 12 {
            return Err(CheckpointError::corrupt("snapshot body too short"));
        }

        let (payload, crc_bytes) = body.split_at(body.len() - 4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().expect("4-byte slice"));
        if !verify_checksum(payload, expected) {
            return Err(CheckpointError::corrupt("snapshot checksum mismatch"));
        }

        let entry_count = u64::from_le_bytes(payload[..8].try_into().expect("8-byte slice"));
        let mut snapshot = Snapshot::with_capacity(entry_count as usize);
        let mut pos = 8usize;

        for _ in 0..entry_count {
            let key = Self::read_chunk(payload, &mut pos)?;
            let value = Self::read_chunk(payload, &mut pos)?;
            snapshot.insert(key, value);
        }

        if pos != payload.len() {
            return Err(CheckpointError::corrupt("trailing bytes after last entry"));
        }
        Ok(snapshot)
    }

    fn read_chunk(payload: &[u8], pos: &mut usize) -> CheckpointResult<Vec<u8>> {
        if payload.len() < *pos + 4 {
            return Err(CheckpointError::corrupt("entry header past end of snapshot"));
        }
        let len =
            u32::from_le_bytes(payload[*pos..*pos + 4].try_into().expect("4-byte slice")) as usize;
        *pos += 4;
        if payload.len() < *pos + len {
            return Err(CheckpointError::corrupt("entry body past end of snapshot"));
        }
        let chunk = payload[*pos..*pos + len].to_vec();
        *pos += len;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(b"1".to_vec(), br#"{"id":1,"name":"pen"}"#.to_vec());
        snapshot.insert(b"2".to_vec(), br#"{"id":2,"name":"ink"}"#.to_vec());
        snapshot
    }

    #[test]
    fn write_then_load_returns_same_map() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let snapshot = sample_snapshot();

        store.write(&snapshot, 12).unwrap();
        let (loaded, manifest) = store.load_latest().unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(manifest.last_sequence, 12);
        assert_eq!(manifest.entry_count, 2);
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn newer_checkpoint_supersedes_and_prunes_older() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        store.write(&sample_snapshot(), 5).unwrap();
        let mut bigger = sample_snapshot();
        bigger.insert(b"3".to_vec(), b"{}".to_vec());
        store.write(&bigger, 9).unwrap();

        let (loaded, manifest) = store.load_latest().unwrap().unwrap();
        assert_eq!(manifest.last_sequence, 9);
        assert_eq!(loaded.len(), 3);
        assert!(!dir.path().join("checkpoint_000000000005.ckpt").exists());
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let manifest = store.write(&sample_snapshot(), 3).unwrap();

        let path = dir.path().join(&manifest.snapshot_file);
        let mut body = fs::read(&path).unwrap();
        let mid = body.len() / 2;
        body[mid] ^= 0xFF;
        fs::write(&path, &body).unwrap();

        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.write(&Snapshot::new(), 0).unwrap();
        let (loaded, manifest) = store.load_latest().unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(manifest.last_sequence, 0);
    }
}
