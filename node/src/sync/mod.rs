//! Sync orchestrator.
//!
//! Coordinates the local cache and the remote store: startup
//! reconciliation, the local-first write path, realtime snapshot
//! reconciliation, retry of pending commits, and manual resync.
//!
//! Every record moves through a small state machine:
//!
//! ```text
//! Clean --write--> Dirty --commit--> Syncing --ack--> Clean
//!                                       |
//!                                       +--error--> Failed --retry--> Syncing
//! ```
//!
//! An entry that exhausts its retry budget stays queued in `Failed` until
//! connectivity comes back or a manual resync runs.

mod bootstrap;
mod realtime;
mod recovery;
mod write;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use waypost_engine::{
    BackoffPolicy, Listing, MediaResolver, NodeRole, PendingEntry, PendingQueue, RecordId,
    SyncState, Timestamp,
};

use crate::cache::LocalCache;
use crate::network::NetworkMonitor;
use crate::remote::RemoteStore;

/// Called with the current record set after the initial load and after
/// every realtime snapshot.
pub type RefreshCallback = Arc<dyn Fn(&[Listing]) + Send + Sync>;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub role: NodeRole,
    pub media: MediaResolver,
    pub backoff: BackoffPolicy,
}

impl SyncOptions {
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            media: MediaResolver::passthrough(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_media(mut self, media: MediaResolver) -> Self {
        self.media = media;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Outcome of a write or delete whose local half succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    /// The remote store acknowledged the change
    Synced,
    /// Offline or remote unreachable; the change waits in the pending queue
    Queued,
    /// A later change for the same id replaced this one before it landed
    Superseded,
}

/// What startup reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub role: NodeRole,
    pub degraded: bool,
    pub uploaded: usize,
    pub accepted: usize,
    pub discarded: usize,
}

/// What applying one remote snapshot did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub upserted: usize,
    pub removed: usize,
    pub swept: usize,
    pub failed: usize,
}

/// What draining the pending queue did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: usize,
    pub committed: usize,
    pub superseded: usize,
    pub failed: usize,
    /// Entries still queued afterwards
    pub remaining: usize,
}

/// Snapshot of the orchestrator for a status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub role: NodeRole,
    pub online: bool,
    pub remote_reachable: bool,
    pub degraded: bool,
    pub subscribed: bool,
    pub pending: usize,
}

struct Inner {
    options: SyncOptions,
    cache: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    monitor: NetworkMonitor,
    queue: Mutex<PendingQueue>,
    states: DashMap<RecordId, SyncState>,
    remote_reachable: AtomicBool,
    degraded: AtomicBool,
    /// Set by a degraded start until the two-way merge has run once
    merge_pending: AtomicBool,
    network_rx: Mutex<Option<watch::Receiver<bool>>>,
    network_task: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<JoinHandle<()>>>,
    drain_lock: Mutex<()>,
    refresh: OnceLock<RefreshCallback>,
}

/// Handle to the sync engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Wire an orchestrator to its stores. Nothing talks to the remote store
    /// until [`SyncOrchestrator::start`].
    pub fn new(
        options: SyncOptions,
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        monitor: NetworkMonitor,
    ) -> Self {
        let network_rx = monitor.subscribe();
        Self {
            inner: Arc::new(Inner {
                options,
                cache,
                remote,
                monitor,
                queue: Mutex::new(PendingQueue::new()),
                states: DashMap::new(),
                remote_reachable: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                merge_pending: AtomicBool::new(false),
                network_rx: Mutex::new(Some(network_rx)),
                network_task: Mutex::new(None),
                subscription: Mutex::new(None),
                drain_lock: Mutex::new(()),
                refresh: OnceLock::new(),
            }),
        }
    }

    /// Install the refresh callback. Only the first call takes effect.
    pub fn on_refresh(&self, callback: impl Fn(&[Listing]) + Send + Sync + 'static) -> bool {
        self.inner.refresh.set(Arc::new(callback)).is_ok()
    }

    pub fn role(&self) -> NodeRole {
        self.inner.options.role
    }

    pub fn sync_state(&self, id: &str) -> Option<SyncState> {
        self.inner.states.get(id).map(|s| *s)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Copy of the pending queue, ordered by id.
    pub async fn pending_entries(&self) -> Vec<PendingEntry> {
        self.inner.queue.lock().await.entries()
    }

    pub async fn is_subscribed(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            role: self.role(),
            online: self.inner.monitor.is_online(),
            remote_reachable: self.inner.remote_reachable.load(Ordering::SeqCst),
            degraded: self.inner.degraded.load(Ordering::SeqCst),
            subscribed: self.is_subscribed().await,
            pending: self.pending_count().await,
        }
    }

    /// Cancel the realtime subscription. Queued entries are kept.
    pub async fn unsubscribe(&self) {
        if let Some(task) = self.inner.subscription.lock().await.take() {
            task.abort();
            tracing::info!("Realtime subscription cancelled");
        }
    }

    /// Stop every background task.
    pub async fn shutdown(&self) {
        self.unsubscribe().await;
        if let Some(task) = self.inner.network_task.lock().await.take() {
            task.abort();
        }
    }

    /// Whether a commit should be attempted right now.
    fn remote_available(&self) -> bool {
        self.inner.monitor.is_online() && self.inner.remote_reachable.load(Ordering::SeqCst)
    }

    fn mark_reachable(&self) {
        self.inner.remote_reachable.store(true, Ordering::SeqCst);
        if self.inner.degraded.swap(false, Ordering::SeqCst) {
            tracing::info!("Remote store reachable again, leaving degraded mode");
        }
    }

    fn enter_degraded(&self) {
        self.inner.remote_reachable.store(false, Ordering::SeqCst);
        self.inner.degraded.store(true, Ordering::SeqCst);
        self.inner.merge_pending.store(true, Ordering::SeqCst);
    }

    fn merge_pending(&self) -> bool {
        self.inner.merge_pending.load(Ordering::SeqCst)
    }

    fn notify(&self, listings: &[Listing]) {
        if let Some(refresh) = self.inner.refresh.get() {
            refresh(listings);
        }
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("role", &self.role())
            .field("remote", &self.inner.remote.name())
            .finish_non_exhaustive()
    }
}

fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
