//! Shared fixtures for node integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use waypost_engine::{BackoffPolicy, Listing, NodeRole, RawDocument};
use waypost_node::cache::MemoryCache;
use waypost_node::remote::MemoryRemote;
use waypost_node::{NetworkMonitor, SyncOptions, SyncOrchestrator};

/// An orchestrator wired to in-memory stores, plus handles to poke them.
pub struct Harness {
    pub sync: SyncOrchestrator,
    pub cache: Arc<MemoryCache>,
    pub remote: Arc<MemoryRemote>,
    pub monitor: NetworkMonitor,
    /// Size of every record set handed to the refresh callback
    pub refreshes: Arc<Mutex<Vec<usize>>>,
}

impl Harness {
    pub fn new(role: NodeRole, cache: MemoryCache, remote: MemoryRemote) -> Self {
        Self::with_options(fast_options(role), cache, remote)
    }

    pub fn with_options(options: SyncOptions, cache: MemoryCache, remote: MemoryRemote) -> Self {
        let cache = Arc::new(cache);
        let remote = Arc::new(remote);
        let monitor = NetworkMonitor::new(true);
        let sync = SyncOrchestrator::new(options, cache.clone(), remote.clone(), monitor.clone());

        let refreshes = Arc::new(Mutex::new(Vec::new()));
        let seen = refreshes.clone();
        sync.on_refresh(move |listings| seen.lock().unwrap().push(listings.len()));

        Self {
            sync,
            cache,
            remote,
            monitor,
            refreshes,
        }
    }

    pub fn refresh_sizes(&self) -> Vec<usize> {
        self.refreshes.lock().unwrap().clone()
    }

    /// Flip connectivity off and back on.
    pub async fn reconnect(&self) {
        self.monitor.set_online(false);
        tokio::task::yield_now().await;
        self.monitor.set_online(true);
    }
}

/// Default retry budget with millisecond delays, so tests stay fast.
pub fn fast_options(role: NodeRole) -> SyncOptions {
    SyncOptions::new(role).with_backoff(BackoffPolicy::new(3, 1))
}

pub fn listing(id: &str, title: &str) -> Listing {
    Listing::new(id, title)
}

pub fn doc(id: &str, title: &str) -> RawDocument {
    RawDocument::new(id, json!({ "id": id, "title": title }))
}

pub fn title_of(value: &Option<Value>) -> Option<&str> {
    value.as_ref()?.get("title")?.as_str()
}

/// Poll a condition until it holds, failing the test after a few seconds.
/// The condition may `.await`.
#[allow(unused_macros)]
macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let mut satisfied = false;
        for _ in 0..300 {
            if $cond {
                satisfied = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(satisfied, "timed out waiting for: {}", $what);
    }};
}
