//! Waypost Node - keeps a local listing cache in step with a remote
//! document store.
//!
//! The node wires the deterministic `waypost-engine` core to real IO: a
//! durable local cache, a remote store adapter, a network monitor, and the
//! [`SyncOrchestrator`] that coordinates them. A small HTTP control surface
//! exposes status, manual resync, and connectivity overrides.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod remote;
pub mod retry;
pub mod routes;
pub mod sync;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use crate::config::Config;
pub use crate::network::NetworkMonitor;
pub use crate::sync::{CommitStatus, SyncOptions, SyncOrchestrator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: SyncOrchestrator,
    pub monitor: NetworkMonitor,
    pub config: Arc<Config>,
}

/// Build the HTTP control surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
