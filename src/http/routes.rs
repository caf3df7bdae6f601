//! Item and health endpoints
//!
//! - `POST /items` stores `{id, name}` keyed by `id`, echoing it back
//! - `GET /items/{id}` fetches it, 404 when absent
//! - `GET /health` reports coordinator and engine state

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::error;

use crate::engine::{EngineError, EngineState, StoreEngine};
use crate::lifecycle::CoordinatorState;

/// Shared state injected into every handler.
pub struct GatewayState {
    engine: Arc<StoreEngine>,
    coordinator: watch::Receiver<CoordinatorState>,
}

impl GatewayState {
    /// Composes the gateway over the engine and the coordinator's state feed.
    pub fn new(engine: Arc<StoreEngine>, coordinator: watch::Receiver<CoordinatorState>) -> Self {
        Self {
            engine,
            coordinator,
        }
    }

    /// Rejects the request unless the coordinator is `Running`.
    fn ensure_running(&self) -> Result<(), Response> {
        let state = *self.coordinator.borrow();
        if state == CoordinatorState::Running {
            Ok(())
        } else {
            Err(unavailable(format!("store is {}", state.as_str())))
        }
    }
}

/// The stored payload shape. The engine itself never sees this type, only
/// its serialized bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn unavailable(reason: String) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody { error: reason }),
    )
        .into_response()
}

fn internal(reason: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: reason }),
    )
        .into_response()
}

/// Routes for storing and fetching items.
pub fn item_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/items", post(store_item))
        .route("/items/:id", get(fetch_item))
        .with_state(state)
}

/// Health check route.
pub fn health_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// `POST /items`
async fn store_item(
    State(state): State<Arc<GatewayState>>,
    Json(item): Json<Item>,
) -> Response {
    if let Err(response) = state.ensure_running() {
        return response;
    }

    let body = match serde_json::to_vec(&item) {
        Ok(body) => body,
        Err(e) => return internal(format!("serialization failed: {}", e)),
    };

    // The append fsyncs; keep it off the async worker threads
    let engine = Arc::clone(&state.engine);
    let key = item.id.to_string();
    let result = tokio::task::spawn_blocking(move || engine.set(key.as_bytes(), &body)).await;

    match result {
        Ok(Ok(())) => Json(item).into_response(),
        Ok(Err(EngineError::Degraded)) => unavailable("store is degraded".to_string()),
        Ok(Err(e)) => {
            error!(error = %e, "write failed");
            internal(format!("write failed: {}", e))
        }
        Err(e) => {
            error!(error = %e, "write task failed");
            internal("write task failed".to_string())
        }
    }
}

/// `GET /items/{id}`
async fn fetch_item(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = state.ensure_running() {
        return response;
    }

    match state.engine.get(id.to_string().as_bytes()) {
        Ok(Some(bytes)) => match serde_json::from_slice::<Item>(&bytes) {
            Ok(item) => Json(item).into_response(),
            Err(e) => internal(format!("stored value is not a valid item: {}", e)),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("item {} not found", id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "read failed");
            internal(format!("read failed: {}", e))
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    coordinator: &'static str,
    engine: &'static str,
    entries: usize,
}

/// `GET /health`
async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    let coordinator = *state.coordinator.borrow();
    let engine = state.engine.state();
    let healthy = coordinator == CoordinatorState::Running && engine == EngineState::Ready;

    let body = HealthResponse {
        status: if healthy { "ok" } else { "unavailable" },
        coordinator: coordinator.as_str(),
        engine: engine.as_str(),
        entries: state.engine.entry_count(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}
