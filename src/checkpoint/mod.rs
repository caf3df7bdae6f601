//! Checkpoint subsystem
//!
//! A checkpoint is a full snapshot of the map paired with the log position
//! marker that says "replay starts after this sequence". Checkpoints bound
//! recovery time regardless of total write history.
//!
//! # Durable Write Order
//!
//! 1. Write snapshot body to a temp file
//! 2. fsync the snapshot, rename it into place
//! 3. Write the manifest to a temp file, fsync, rename over `MANIFEST.json`
//! 4. fsync the checkpoints directory
//! 5. Prune superseded snapshot files
//!
//! A crash at any step leaves either the previous checkpoint or the new one
//! fully valid; a snapshot without a manifest pointing at it is ignored.
//!
//! # Foreground Impact
//!
//! Capture of the map happens under a short read-lock clone in the engine;
//! everything in this module runs on already-copied data and never holds
//! engine locks.

mod errors;
mod manifest;
mod store;

pub use errors::{CheckpointError, CheckpointResult};
pub use manifest::{CheckpointManifest, MANIFEST_FILE_NAME};
pub use store::{CheckpointStore, Snapshot};
