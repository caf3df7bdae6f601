//! Lifecycle error types
//!
//! All of these are fatal for the process: the gateway has no safe way to
//! serve traffic against an engine that never became ready or whose
//! background loop died.

use thiserror::Error;

use crate::engine::EngineError;

/// Errors surfaced by the lifecycle coordinator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The engine did not reach ready within the configured wait
    #[error("engine did not become ready within {timeout_ms} ms")]
    StartupTimeout { timeout_ms: u64 },

    /// Engine startup ran but failed
    #[error("engine startup failed: {0}")]
    Startup(#[from] EngineError),

    /// The engine's background loop terminated unexpectedly
    #[error("engine background loop terminated unexpectedly")]
    EngineCrashed,
}

impl LifecycleError {
    /// Process exit code for this failure.
    ///
    /// Startup timeout and unrecoverable storage corruption share a distinct
    /// code so operators can tell them from generic failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::StartupTimeout { .. } => 2,
            LifecycleError::Startup(_) => 2,
            LifecycleError::EngineCrashed => 1,
        }
    }
}
