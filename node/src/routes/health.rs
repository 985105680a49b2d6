//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use waypost_engine::NodeRole;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub role: NodeRole,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler. The node is healthy whenever it can answer; a
/// degraded sync state shows up on `/status` instead.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        role: state.sync.role(),
    })
}

/// Root handler. Names the node so operators can tell instances apart.
async fn root(State(state): State<AppState>) -> String {
    format!(
        "Waypost sync node {} ({})",
        state.config.node_identity,
        state.sync.role()
    )
}
