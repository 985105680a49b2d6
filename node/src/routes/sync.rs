//! Sync control routes.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::network::NetworkStatus;
use crate::sync::SyncStatus;
use crate::AppState;

/// Manual resync response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub refreshed: usize,
    pub status: SyncStatus,
}

/// Connectivity override response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub network: NetworkStatus,
    pub changed: bool,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status_handler))
        .route("/resync", post(resync_handler))
        .route("/network/online", post(online_handler))
        .route("/network/offline", post(offline_handler))
}

/// GET /status - Current sync status.
async fn status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status().await)
}

/// POST /resync - Re-fetch the remote collection and drain pending changes.
async fn resync_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ResyncResponse>> {
    let refreshed = state.sync.resync().await?;
    Ok(Json(ResyncResponse {
        refreshed,
        status: state.sync.status().await,
    }))
}

/// POST /network/online - Declare connectivity restored.
async fn online_handler(State(state): State<AppState>, _auth: AuthUser) -> Json<NetworkResponse> {
    set_network(&state, true)
}

/// POST /network/offline - Declare connectivity lost.
async fn offline_handler(State(state): State<AppState>, _auth: AuthUser) -> Json<NetworkResponse> {
    set_network(&state, false)
}

fn set_network(state: &AppState, online: bool) -> Json<NetworkResponse> {
    let changed = state.monitor.set_online(online);
    Json(NetworkResponse {
        network: state.monitor.status(),
        changed,
    })
}
