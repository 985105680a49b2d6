//! Realtime reconciliation against remote snapshots.

use futures::StreamExt;
use waypost_engine::{
    listing_from_remote, plan_snapshot, Listing, NodeRole, RawDocument, RecordId,
    RemoteSnapshot, SyncState,
};

use super::{ReconcileReport, SyncOrchestrator};
use crate::error::{SyncError, SyncResult};

impl SyncOrchestrator {
    /// Apply one remote snapshot to the local cache.
    ///
    /// Added and modified documents are decoded and cached, removed ones are
    /// deleted, and a replica additionally drops every cached id the
    /// snapshot does not contain. A record that fails to decode or store is
    /// logged and skipped; the rest of the snapshot still applies.
    pub async fn apply_snapshot(&self, snapshot: &RemoteSnapshot) -> ReconcileReport {
        let role = self.role();
        let local_ids: Vec<RecordId> = match role {
            NodeRole::Replica => match self.inner.cache.ids().await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot list cached ids, skipping sweep");
                    Vec::new()
                }
            },
            NodeRole::Primary => Vec::new(),
        };

        let plan = plan_snapshot(role, &local_ids, snapshot);
        let mut report = ReconcileReport::default();

        for document in &plan.upserts {
            match self.accept_remote(document).await {
                Ok(_) => report.upserted += 1,
                Err(e) => {
                    tracing::warn!(id = %document.id, error = %e, "Skipping remote record");
                    report.failed += 1;
                }
            }
        }

        for id in &plan.removals {
            match self.evict(id).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Failed to remove record");
                    report.failed += 1;
                }
            }
        }

        for id in &plan.sweep {
            match self.evict(id).await {
                Ok(()) => report.swept += 1,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Failed to sweep record");
                    report.failed += 1;
                }
            }
        }

        self.mark_reachable();

        let listings: Vec<Listing> = snapshot
            .documents
            .iter()
            .filter_map(|doc| listing_from_remote(doc, &self.inner.options.media).ok())
            .collect();
        self.notify(&listings);

        tracing::debug!(
            upserted = report.upserted,
            removed = report.removed,
            swept = report.swept,
            failed = report.failed,
            "Applied remote snapshot"
        );
        report
    }

    /// Open the standing subscription unless one is already running.
    ///
    /// The slot lock is not held while the remote store is contacted, so
    /// status reads never wait on a slow remote. If two callers race, the
    /// later subscription is dropped.
    pub async fn subscribe(&self) -> SyncResult<()> {
        if self.is_subscribed().await {
            return Ok(());
        }

        let mut subscription = self
            .inner
            .remote
            .subscribe()
            .await
            .map_err(|source| SyncError::RemoteUnavailable { id: None, source })?;

        let mut slot = self.inner.subscription.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            subscription.unsubscribe();
            return Ok(());
        }

        let weak = self.downgrade();
        *slot = Some(tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let Some(orchestrator) = SyncOrchestrator::from_weak(&weak) else {
                    break;
                };
                orchestrator.apply_snapshot(&snapshot).await;
            }
            tracing::debug!("Realtime subscription ended");
        }));

        tracing::info!(remote = self.inner.remote.name(), "Realtime subscription established");
        Ok(())
    }

    /// Decode a remote document and cache it.
    pub(super) async fn accept_remote(&self, document: &RawDocument) -> SyncResult<Listing> {
        let listing = listing_from_remote(document, &self.inner.options.media)?;
        self.accept_listing(&listing).await?;
        Ok(listing)
    }

    /// Cache a remote listing. An id with a queued delete is left alone:
    /// the local deletion wins until the remote store has caught up.
    pub(super) async fn accept_listing(&self, listing: &Listing) -> SyncResult<()> {
        let pending = self
            .inner
            .queue
            .lock()
            .await
            .get(&listing.id)
            .map(|entry| entry.op.is_delete());
        if pending == Some(true) {
            tracing::debug!(id = %listing.id, "Ignoring remote copy of locally deleted record");
            return Ok(());
        }

        self.inner.cache.put(listing).await?;
        if pending.is_none() {
            self.inner.states.insert(listing.id.clone(), SyncState::Clean);
        }
        Ok(())
    }

    pub(super) async fn evict(&self, id: &str) -> SyncResult<()> {
        self.inner.cache.delete(id).await?;
        self.inner.states.remove(id);
        Ok(())
    }
}
