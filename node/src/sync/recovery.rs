//! Pending queue drain and manual resync.

use super::{CommitStatus, DrainReport, SyncOrchestrator};
use crate::error::{SyncError, SyncResult};

impl SyncOrchestrator {
    /// Retry every queued change with a fresh attempt budget.
    ///
    /// Any successful commit marks the remote store reachable again and
    /// re-opens the realtime subscription if it is down. Concurrent drains
    /// are serialized.
    pub async fn drain_pending(&self) -> DrainReport {
        let _draining = self.inner.drain_lock.lock().await;

        let entries = {
            let mut queue = self.inner.queue.lock().await;
            queue.reset_attempts();
            queue.entries()
        };
        let mut report = DrainReport {
            attempted: entries.len(),
            ..DrainReport::default()
        };

        for entry in entries {
            match self.commit(&entry.id, entry.generation).await {
                Ok(CommitStatus::Synced) => report.committed += 1,
                Ok(_) => report.superseded += 1,
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "Pending change still not committed");
                    report.failed += 1;
                }
            }
        }

        if report.committed > 0 {
            self.mark_reachable();
            if let Err(e) = self.subscribe().await {
                tracing::warn!(error = %e, "Could not re-open realtime subscription");
            }
        }

        report.remaining = self.pending_count().await;
        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                committed = report.committed,
                remaining = report.remaining,
                "Drained pending queue"
            );
        }
        report
    }

    /// Drain the pending queue, then re-fetch the remote collection into
    /// the local cache.
    ///
    /// Queued changes go first so a pending delete is not undone by the
    /// remote copy it is about to remove. Remote records are written over
    /// their local copies and nothing is deleted locally. After a degraded
    /// start this runs the full two-way merge instead, uploading records
    /// that only exist locally. Returns the number of records refreshed.
    pub async fn resync(&self) -> SyncResult<usize> {
        let needs_merge = self.merge_pending();
        let drained = self.drain_pending().await;

        let documents = self
            .inner
            .remote
            .fetch_all()
            .await
            .map_err(|source| SyncError::RemoteUnavailable { id: None, source })?;

        let refreshed = if needs_merge {
            self.merge_remote(&documents).await?.accepted
        } else {
            self.mark_reachable();
            let mut refreshed = 0;
            for document in &documents {
                match self.accept_remote(document).await {
                    Ok(_) => refreshed += 1,
                    Err(e) => tracing::warn!(id = %document.id, error = %e, "Skipping remote record"),
                }
            }
            refreshed
        };

        if let Err(e) = self.subscribe().await {
            tracing::warn!(error = %e, "Could not re-open realtime subscription");
        }

        let current = self.inner.cache.get_all().await?;
        self.notify(&current);

        tracing::info!(refreshed, committed = drained.committed, "Manual resync complete");
        Ok(refreshed)
    }

    /// React to connectivity coming back: drain, merge with the remote
    /// collection if the node started degraded, then make sure the
    /// subscription is up.
    pub(super) async fn recover(&self) {
        let needs_merge = self.merge_pending();
        let report = self.drain_pending().await;
        if report.failed > 0 {
            return;
        }

        if needs_merge {
            let documents = match self.inner.remote.fetch_all().await {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::debug!(error = %e, "Remote store still unreachable");
                    return;
                }
            };
            match self.merge_remote(&documents).await {
                Ok(merged) => tracing::info!(
                    uploaded = merged.uploaded,
                    accepted = merged.accepted,
                    discarded = merged.discarded,
                    "Merged with remote store after degraded start"
                ),
                Err(e) => tracing::warn!(error = %e, "Merge after degraded start failed"),
            }
        }

        if self.is_subscribed().await {
            return;
        }
        match self.subscribe().await {
            Ok(()) => self.mark_reachable(),
            Err(e) => tracing::debug!(error = %e, "Remote store still unreachable"),
        }
    }
}
