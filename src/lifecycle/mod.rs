//! Lifecycle coordination
//!
//! Sequences startup so the API gateway never observes an engine that is
//! not ready, and supervises the engine's background loop for the life of
//! the process.
//!
//! # State Machine
//!
//! `NotStarted → Launching → AwaitingReady → Running → ShuttingDown`, with a
//! terminal `Failed` when startup times out or the background loop dies.
//!
//! - `Launching`: the engine (including filesystem recovery, which can take
//!   arbitrarily long on a large log) is started on a background blocking
//!   task without blocking the caller
//! - `AwaitingReady`: bounded wait for the engine to come up; elapse is a
//!   `StartupTimeout`, fatal for the process — there is no safe way to serve
//! - `Running`: passive supervision; unexpected termination of the
//!   background loop surfaces as `EngineCrashed` and flips the state to
//!   `Failed` so the gateway refuses further requests
//! - `ShuttingDown`: a final checkpoint/flush runs under a bounded grace
//!   period, best effort
//!
//! The state is published through a `watch` channel: an observable readiness
//! signal, not a guessed startup delay.

mod errors;

pub use errors::LifecycleError;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::engine::{EngineState, StoreEngine};

/// Coordinator state, observable by the API gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    NotStarted,
    Launching,
    AwaitingReady,
    Running,
    ShuttingDown,
    /// Terminal: startup failed or the engine's background loop crashed
    Failed,
}

impl CoordinatorState {
    /// Lowercase name for logs and the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorState::NotStarted => "not_started",
            CoordinatorState::Launching => "launching",
            CoordinatorState::AwaitingReady => "awaiting_ready",
            CoordinatorState::Running => "running",
            CoordinatorState::ShuttingDown => "shutting_down",
            CoordinatorState::Failed => "failed",
        }
    }
}

/// Owns startup sequencing, supervision, and shutdown of the engine.
pub struct Coordinator {
    state_tx: watch::Sender<CoordinatorState>,
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    /// Creates a coordinator in `NotStarted`.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::NotStarted);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state_tx,
            shutdown_tx,
        }
    }

    /// Subscribes to coordinator state changes.
    pub fn state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Launches the engine and waits, up to the configured timeout, for it
    /// to become ready.
    ///
    /// On success the coordinator is `Running`, the engine's background
    /// checkpoint loop is spawned and supervised, and the engine handle is
    /// returned for the gateway. A degraded engine still reaches `Running`
    /// (reads are allowed); the degradation is logged.
    pub async fn start(&self, config: StoreConfig) -> Result<Arc<StoreEngine>, LifecycleError> {
        let startup_timeout = config.startup_timeout();
        let timeout_ms = config.startup_timeout_ms;

        self.state_tx.send_replace(CoordinatorState::Launching);
        let startup = tokio::task::spawn_blocking(move || StoreEngine::open(config));

        self.state_tx.send_replace(CoordinatorState::AwaitingReady);
        let engine = match timeout(startup_timeout, startup).await {
            Err(_elapsed) => {
                self.state_tx.send_replace(CoordinatorState::Failed);
                return Err(LifecycleError::StartupTimeout { timeout_ms });
            }
            Ok(Err(join_err)) => {
                self.state_tx.send_replace(CoordinatorState::Failed);
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                return Err(LifecycleError::EngineCrashed);
            }
            Ok(Ok(Err(e))) => {
                self.state_tx.send_replace(CoordinatorState::Failed);
                return Err(LifecycleError::Startup(e));
            }
            Ok(Ok(Ok(engine))) => engine,
        };

        if engine.state() == EngineState::Degraded {
            warn!("engine is degraded: serving reads only");
        }
        if let Some(report) = engine.recovery_report() {
            if let Some(partial) = &report.partial {
                warn!(%partial, "started after partial recovery");
            }
        }

        self.supervise(Arc::clone(&engine));
        self.state_tx.send_replace(CoordinatorState::Running);
        info!("coordinator running, engine accepting operations");
        Ok(engine)
    }

    /// Spawns the engine's background loop and watches for unexpected exit.
    fn supervise(&self, engine: Arc<StoreEngine>) {
        let loop_handle = tokio::spawn(engine.run_checkpoint_loop(self.shutdown_tx.subscribe()));

        let state_tx = self.state_tx.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = loop_handle.await;
            if *shutdown_rx.borrow() {
                return;
            }
            // The loop only exits early on shutdown; anything else is a crash
            match result {
                Ok(()) => error!("engine crashed: background loop terminated unexpectedly"),
                Err(e) => error!(error = %e, "engine crashed: background loop panicked"),
            }
            state_tx.send_replace(CoordinatorState::Failed);
        });
    }

    /// Graceful shutdown: request a final checkpoint/flush from the engine,
    /// bounded by the configured grace period, then allow process exit.
    pub async fn shutdown(&self, engine: &Arc<StoreEngine>) {
        info!("shutting down");
        self.state_tx.send_replace(CoordinatorState::ShuttingDown);
        let _ = self.shutdown_tx.send(true);

        let grace = engine.config().shutdown_grace();
        let flusher = {
            let engine = Arc::clone(engine);
            tokio::task::spawn_blocking(move || engine.flush_for_shutdown())
        };

        match timeout(grace, flusher).await {
            Err(_elapsed) => {
                warn!(grace_ms = grace.as_millis() as u64, "final flush did not finish within the grace period");
            }
            Ok(Err(e)) => error!(error = %e, "final flush task failed"),
            Ok(Ok(Err(e))) => error!(error = %e, "final flush failed"),
            Ok(Ok(Ok(()))) => info!("clean shutdown complete"),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn start_reaches_running_with_ready_engine() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new();
        let state = coordinator.state();

        let engine = coordinator
            .start(StoreConfig::at(dir.path()))
            .await
            .unwrap();

        assert_eq!(*state.borrow(), CoordinatorState::Running);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn zero_timeout_reports_startup_timeout() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::at(dir.path());
        config.startup_timeout_ms = 0;

        let coordinator = Coordinator::new();
        let state = coordinator.state();
        let err = coordinator.start(config).await.unwrap_err();

        assert!(matches!(err, LifecycleError::StartupTimeout { .. }));
        assert_eq!(*state.borrow(), CoordinatorState::Failed);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_marks_clean_exit() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new();
        let engine = coordinator
            .start(StoreConfig::at(dir.path()))
            .await
            .unwrap();

        engine.set(b"1", b"pen").unwrap();
        coordinator.shutdown(&engine).await;

        assert_eq!(*coordinator.state().borrow(), CoordinatorState::ShuttingDown);
        assert!(dir.path().join("clean_shutdown").exists());
        // Log truncated: the checkpoint now carries the state
        let log = dir.path().join("logs").join("store.wal");
        assert_eq!(std::fs::metadata(log).unwrap().len(), 0);
    }
}
