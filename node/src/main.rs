//! Waypost Node - sync node binary.
//!
//! Opens the local cache, connects to the remote store, reconciles, and then
//! serves the HTTP control surface until shut down.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypost_node::cache::SqliteCache;
use waypost_node::remote::{HttpRemote, HttpRemoteConfig};
use waypost_node::{router, AppState, Config, NetworkMonitor, SyncOptions, SyncOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost_node=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let role = config.role();

    tracing::info!(
        identity = %config.node_identity,
        %role,
        "Starting Waypost node on {}:{}",
        config.host,
        config.port
    );

    // Open the local cache (runs migrations)
    let cache = Arc::new(SqliteCache::connect(&config.database_url).await?);

    let remote = HttpRemote::new(
        HttpRemoteConfig::new(&config.remote_url, &config.remote_collection)
            .with_poll_interval(config.poll_interval),
    )?;

    // Connectivity follows remote reachability
    let monitor = NetworkMonitor::new(true);
    let probe_remote = remote.clone();
    monitor.spawn_probe(config.probe_interval, move || {
        let remote = probe_remote.clone();
        async move { remote.probe().await }
    });

    let options = SyncOptions::new(role).with_media(config.media_resolver()?);
    let sync = SyncOrchestrator::new(options, cache, Arc::new(remote), monitor.clone());
    sync.on_refresh(|listings| {
        tracing::debug!(count = listings.len(), "Listing set refreshed");
    });

    let report = sync.start().await?;
    tracing::info!(
        degraded = report.degraded,
        uploaded = report.uploaded,
        accepted = report.accepted,
        discarded = report.discarded,
        "Sync started"
    );

    let state = AppState {
        sync: sync.clone(),
        monitor,
        config: Arc::new(config.clone()),
    };
    let app = router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    sync.shutdown().await;
    Ok(())
}
