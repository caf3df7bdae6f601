//! HTTP API gateway
//!
//! Thin boundary between clients and the storage engine. The gateway holds
//! the engine reference and the coordinator's readiness signal, injected
//! once at startup; there is no ambient global state.
//!
//! Every request consults the coordinator first: anything other than
//! `Running` gets a service-unavailable response instead of reaching the
//! engine. Serialization of the item payload is owned entirely by this
//! layer; the engine stores opaque bytes.

mod routes;
mod server;

pub use routes::{item_routes, health_routes, GatewayState, Item};
pub use server::HttpServer;
