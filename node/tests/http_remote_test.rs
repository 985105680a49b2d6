//! HTTP remote adapter against a mock document store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use waypost_engine::{ChangeKind, Listing, NodeRole};
use waypost_node::cache::MemoryCache;
use waypost_node::error::RemoteError;
use waypost_node::remote::{HttpRemote, HttpRemoteConfig, RemoteStore};
use waypost_node::{NetworkMonitor, SyncOptions, SyncOrchestrator};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer) -> HttpRemote {
    let config = HttpRemoteConfig::new(server.uri(), "listings")
        .with_poll_interval(Duration::from_millis(20));
    HttpRemote::new(config).unwrap()
}

// ── Fetch ───────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_all_decodes_documents_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "P2", "data": {"title": "Cabin"}},
            {"id": "P1", "data": {"title": "Loft", "images": ["/a.jpg"]}}
        ])))
        .mount(&server)
        .await;

    let docs = remote_for(&server).fetch_all().await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "P2");
    assert_eq!(docs[1].data["images"][0], "/a.jpg");
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = remote_for(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = remote_for(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

// ── Writes ──────────────────────────────────────────────────────

#[tokio::test]
async fn write_patches_with_merge() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/listings/P1"))
        .and(query_param("merge", "true"))
        .and(body_json(json!({"id": "P1", "title": "Loft"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server)
        .write("P1", json!({"id": "P1", "title": "Loft"}), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_write_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .write("P1", json!({"title": "x"}), true)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Rejected(_)));
}

#[tokio::test]
async fn throttled_write_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .write("P1", json!({"title": "x"}), true)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn delete_of_missing_document_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/listings/GONE"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server).delete("GONE").await.unwrap();
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpRemoteConfig::new(server.uri(), "listings").with_auth_token("s3cret");
    let remote = HttpRemote::new(config).unwrap();

    assert!(remote.fetch_all().await.unwrap().is_empty());
}

// ── Subscription ────────────────────────────────────────────────

#[tokio::test]
async fn polling_subscription_emits_changes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "P1", "data": {"title": "Loft"}}])),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "P1", "data": {"title": "Loft"}},
            {"id": "P2", "data": {"title": "Cabin"}}
        ])))
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let mut sub = remote.subscribe().await.unwrap();

    let initial = tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(initial.documents.len(), 1);
    assert_eq!(initial.changes[0].kind, ChangeKind::Added);

    // The unchanged second poll is swallowed; the third reports P2.
    let next = tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.documents.len(), 2);
    assert_eq!(next.changes.len(), 1);
    assert_eq!(next.changes[0].document.id, "P2");

    sub.unsubscribe();
    assert!(sub.next_snapshot().await.is_none());
}

#[tokio::test]
async fn subscribe_fails_when_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    assert!(remote_for(&server).subscribe().await.is_err());
}

// ── Orchestrator over HTTP ──────────────────────────────────────

#[tokio::test]
async fn primary_uploads_local_records_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/listings/L1"))
        .and(query_param("merge", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::with_listings([Listing::new("L1", "Local")]));
    let sync = SyncOrchestrator::new(
        SyncOptions::new(NodeRole::Primary),
        cache,
        Arc::new(remote_for(&server)),
        NetworkMonitor::new(true),
    );

    let report = sync.start().await.unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(sync.pending_count().await, 0);
    sync.shutdown().await;
}
