//! statestore - a durable key-value store behind a small HTTP API
//!
//! A value is written under a caller-supplied key and later retrieved by
//! that key. Writes are acknowledged only once durable in the append-only
//! log; periodic checkpoints bound recovery time; the lifecycle coordinator
//! keeps the HTTP gateway from serving until recovery has finished.
//!
//! ```text
//! client ──► http gateway ──► storage engine ──► durable log
//!                 │                 │                 │
//!                 └── readiness ◄── lifecycle ──► checkpoints
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod recovery;
pub mod wal;

pub use config::StoreConfig;
pub use engine::{EngineState, StoreEngine};
pub use lifecycle::{Coordinator, CoordinatorState, LifecycleError};
