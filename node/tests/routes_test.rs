//! HTTP control surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use waypost_engine::{BackoffPolicy, NodeRole};
use waypost_node::cache::MemoryCache;
use waypost_node::remote::MemoryRemote;
use waypost_node::{router, AppState, Config, NetworkMonitor, SyncOptions, SyncOrchestrator};

const SECRET: &str = "let-me-in";

struct Node {
    state: AppState,
    remote: Arc<MemoryRemote>,
}

async fn node(auth_secret: Option<&str>) -> Node {
    let config = Config::from_lookup(|key| match key {
        "REMOTE_URL" => Some("http://store.invalid".to_string()),
        "AUTH_SECRET" => auth_secret.map(String::from),
        "NODE_IDENTITY" => Some("edge-1".to_string()),
        _ => None,
    })
    .unwrap();

    let remote = Arc::new(MemoryRemote::new());
    remote.insert_document("P1", serde_json::json!({"title": "Loft"})).await;

    let monitor = NetworkMonitor::new(true);
    let sync = SyncOrchestrator::new(
        SyncOptions::new(NodeRole::Primary).with_backoff(BackoffPolicy::new(3, 1)),
        Arc::new(MemoryCache::new()),
        remote.clone(),
        monitor.clone(),
    );
    sync.start().await.unwrap();

    Node {
        state: AppState {
            sync,
            monitor,
            config: Arc::new(config),
        },
        remote,
    }
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_and_banner() {
    let node = node(None).await;

    let (status, body) = send(&node.state, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["role"], "primary");

    let response = router(node.state.clone()).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"Waypost sync node edge-1 (primary)");
}

#[tokio::test]
async fn status_reports_sync_state() {
    let node = node(None).await;

    let (status, body) = send(&node.state, get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "primary");
    assert_eq!(body["online"], true);
    assert_eq!(body["remoteReachable"], true);
    assert_eq!(body["degraded"], false);
    assert_eq!(body["pending"], 0);
}

#[tokio::test]
async fn control_endpoints_require_token_when_configured() {
    let node = node(Some(SECRET)).await;

    let (status, body) = send(&node.state, post("/resync", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(&node.state, post("/network/offline", Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(node.state.monitor.is_online());

    let (status, body) = send(&node.state, post("/resync", Some(SECRET))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], 1);
    assert_eq!(body["status"]["subscribed"], true);
}

#[tokio::test]
async fn network_override_toggles_connectivity() {
    let node = node(None).await;

    let (status, body) = send(&node.state, post("/network/offline", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["network"], "offline");
    assert_eq!(body["changed"], true);

    let (_, body) = send(&node.state, post("/network/offline", None)).await;
    assert_eq!(body["changed"], false);

    let (_, body) = send(&node.state, get("/status")).await;
    assert_eq!(body["online"], false);

    let (_, body) = send(&node.state, post("/network/online", None)).await;
    assert_eq!(body["network"], "online");
}

#[tokio::test]
async fn resync_against_unreachable_remote_is_503() {
    let node = node(None).await;
    node.remote.set_available(false);

    let (status, body) = send(&node.state, post("/resync", None)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Remote store unavailable");
}
