//! Engine state tracking
//!
//! The state moves once per process lifetime from `Initializing` through
//! `Recovering` to `Ready`, or to `Degraded` on unrecoverable corruption.
//! It never cycles back except via process restart.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Directories and subsystems are being brought up
    Initializing = 0,
    /// Checkpoint load and log replay in progress
    Recovering = 1,
    /// Serving reads and writes
    Ready = 2,
    /// Unrecoverable log/checkpoint corruption: writes rejected, reads may
    /// serve whatever state was recovered
    Degraded = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Initializing,
            1 => EngineState::Recovering,
            2 => EngineState::Ready,
            _ => EngineState::Degraded,
        }
    }

    /// Lowercase name for logs and the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Initializing => "initializing",
            EngineState::Recovering => "recovering",
            EngineState::Ready => "ready",
            EngineState::Degraded => "degraded",
        }
    }
}

/// Atomically shared engine state, queryable from any thread.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Creates a cell in the `Initializing` state.
    pub fn new() -> Self {
        Self(AtomicU8::new(EngineState::Initializing as u8))
    }

    /// Current state.
    pub fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Transition to a new state.
    pub fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
