//! Checkpoint manifest
//!
//! `MANIFEST.json` names the current snapshot file and the log sequence it
//! covers. A snapshot is only valid paired with this marker; replay starts
//! after `last_sequence`.

use std::fs::{self, File};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::CheckpointResult;

/// Manifest file name inside the checkpoints directory.
pub const MANIFEST_FILE_NAME: &str = "MANIFEST.json";

/// Points at the current snapshot and its log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    /// Snapshot file name, relative to the checkpoints directory
    pub snapshot_file: String,
    /// Highest log sequence captured in the snapshot; replay starts after it
    pub last_sequence: u64,
    /// Number of entries in the snapshot
    pub entry_count: u64,
    /// RFC3339 creation timestamp
    pub created_at: String,
}

impl CheckpointManifest {
    /// Create a manifest for a snapshot taken at `last_sequence`.
    pub fn new(snapshot_file: impl Into<String>, last_sequence: u64, entry_count: u64) -> Self {
        Self {
            snapshot_file: snapshot_file.into(),
            last_sequence,
            entry_count,
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    /// Writes the manifest durably: temp file, fsync, rename into place.
    ///
    /// The temp name carries the sequence so two manifests never share one.
    pub fn write_to(&self, dir: &Path) -> CheckpointResult<()> {
        let tmp_path = dir.join(format!("{}.{}.tmp", MANIFEST_FILE_NAME, self.last_sequence));
        let final_path = dir.join(MANIFEST_FILE_NAME);

        let body = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp_path, &body)?;
        File::open(&tmp_path)?.sync_all()?;
        fs::rename(&tmp_path, &final_path)?;
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    /// Loads the manifest from `dir`, or `None` if no manifest exists.
    pub fn load_from(dir: &Path) -> CheckpointResult<Option<Self>> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_slice(&body)?;
        Ok(Some(manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let manifest = CheckpointManifest::new("checkpoint_000042.ckpt", 42, 17);
        manifest.write_to(dir.path()).unwrap();

        let loaded = CheckpointManifest::load_from(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(CheckpointManifest::load_from(dir.path()).unwrap().is_none());
    }

    #[test]
    fn rewrite_replaces_previous_manifest() {
        let dir = TempDir::new().unwrap();
        CheckpointManifest::new("checkpoint_000001.ckpt", 1, 1)
            .write_to(dir.path())
            .unwrap();
        CheckpointManifest::new("checkpoint_000009.ckpt", 9, 3)
            .write_to(dir.path())
            .unwrap();

        let loaded = CheckpointManifest::load_from(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.last_sequence, 9);
        assert_eq!(loaded.snapshot_file, "checkpoint_000009.ckpt");
    }
}
