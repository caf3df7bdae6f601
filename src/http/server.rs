//! HTTP server assembly
//!
//! Builds the router from the route groups and serves it with graceful
//! shutdown, CORS, and request tracing.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::StoreConfig;

use super::routes::{health_routes, item_routes, GatewayState};

/// The store's HTTP endpoint.
pub struct HttpServer {
    addr: String,
    router: Router,
}

impl HttpServer {
    /// Builds the server over the shared gateway state.
    pub fn new(config: &StoreConfig, state: Arc<GatewayState>) -> Self {
        Self {
            addr: config.socket_addr(),
            router: Self::build_router(state),
        }
    }

    /// Combines all route groups with CORS and tracing layers.
    fn build_router(state: Arc<GatewayState>) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(health_routes(Arc::clone(&state)))
            .merge(item_routes(state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for in-process testing.
    pub fn router(self) -> Router {
        self.router
    }

    /// Binds the listener and serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "http endpoint listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
