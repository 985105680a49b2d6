//! Startup reconciliation and background task wiring.

use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use waypost_engine::{
    listing_from_remote, plan_bootstrap, validate_listing, Listing, PendingOp, RawDocument,
    SyncState,
};

use super::{StartupReport, SyncOrchestrator};
use crate::error::SyncResult;

impl SyncOrchestrator {
    /// Bring the local cache in line with the remote store, then go live.
    ///
    /// If the remote store cannot be reached the node runs in degraded mode
    /// on its local cache alone. Otherwise a primary uploads records the
    /// remote store lacks and accepts the remote copy of everything else,
    /// while a replica mirrors the remote set exactly. Either way the
    /// realtime subscription is opened afterwards.
    pub async fn start(&self) -> SyncResult<StartupReport> {
        let role = self.role();
        self.spawn_network_listener().await;

        let documents = match self.inner.remote.fetch_all().await {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Remote store unreachable at startup, running in degraded mode"
                );
                self.enter_degraded();
                let local = self.inner.cache.get_all().await?;
                self.notify(&local);
                return Ok(StartupReport {
                    role,
                    degraded: true,
                    uploaded: 0,
                    accepted: 0,
                    discarded: 0,
                });
            }
        };

        let report = self.merge_remote(&documents).await?;

        if let Err(e) = self.subscribe().await {
            tracing::warn!(error = %e, "Could not open realtime subscription");
        }

        let current = self.inner.cache.get_all().await?;
        self.notify(&current);

        tracing::info!(
            role = %report.role,
            uploaded = report.uploaded,
            accepted = report.accepted,
            discarded = report.discarded,
            "Startup reconciliation complete"
        );
        Ok(report)
    }

    /// Run the two-way merge of the local cache against a fresh copy of
    /// the remote collection.
    ///
    /// Used at startup and again on the first successful contact after a
    /// degraded start, so records that only ever existed locally still
    /// reach the remote store.
    pub(super) async fn merge_remote(&self, documents: &[RawDocument]) -> SyncResult<StartupReport> {
        let role = self.role();
        let local = self.inner.cache.get_all().await?;
        self.mark_reachable();

        let remote: Vec<Listing> = documents
            .iter()
            .filter_map(|doc| match listing_from_remote(doc, &self.inner.options.media) {
                Ok(listing) => Some(listing),
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "Skipping undecodable remote record");
                    None
                }
            })
            .collect();

        let plan = plan_bootstrap(role, &local, &remote);
        let mut report = StartupReport {
            role,
            degraded: false,
            uploaded: 0,
            accepted: 0,
            discarded: 0,
        };

        for id in &plan.discard {
            match self.evict(id).await {
                Ok(()) => report.discarded += 1,
                Err(e) => tracing::warn!(id = %id, error = %e, "Failed to discard local record"),
            }
        }

        for listing in &plan.accept {
            match self.accept_listing(listing).await {
                Ok(()) => report.accepted += 1,
                Err(e) => tracing::warn!(id = %listing.id, error = %e, "Failed to accept remote record"),
            }
        }

        for listing in plan.upload {
            if self.upload(listing).await {
                report.uploaded += 1;
            }
        }

        self.inner.merge_pending.store(false, Ordering::SeqCst);
        Ok(report)
    }

    /// Queue and commit a local-only record. Returns whether the remote
    /// store took it.
    async fn upload(&self, listing: Listing) -> bool {
        if let Err(e) = validate_listing(&listing) {
            tracing::warn!(id = %listing.id, error = %e, "Not uploading invalid local record");
            return false;
        }

        let id = listing.id.clone();
        let generation = self
            .inner
            .queue
            .lock()
            .await
            .enqueue(id.clone(), PendingOp::Write { listing });
        self.inner.states.insert(id.clone(), SyncState::Dirty);

        if !self.remote_available() {
            tracing::debug!(id = %id, "Offline, upload queued");
            return false;
        }
        match self.commit(&id, generation).await {
            Ok(status) => {
                tracing::debug!(id = %id, ?status, "Uploaded local record");
                true
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Upload deferred to pending queue");
                false
            }
        }
    }

    /// Drain the pending queue whenever connectivity comes back. Runs once
    /// per orchestrator.
    async fn spawn_network_listener(&self) {
        let Some(rx) = self.inner.network_rx.lock().await.take() else {
            return;
        };
        let task = self.network_listener(rx);
        *self.inner.network_task.lock().await = Some(task);
    }

    fn network_listener(&self, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak = self.downgrade();
        let _ = rx.borrow_and_update();

        tokio::spawn(async move {
            // The monitor only notifies on transitions, so a notification
            // that reads online always follows an offline period, even if
            // that period was too short to observe here.
            while rx.changed().await.is_ok() {
                if !*rx.borrow_and_update() {
                    continue;
                }

                let Some(orchestrator) = SyncOrchestrator::from_weak(&weak) else {
                    break;
                };
                tracing::info!("Connectivity restored, draining pending queue");
                orchestrator.recover().await;
            }
        })
    }
}
