//! Local-first write and delete paths.
//!
//! Every change lands in the local cache and the pending queue before the
//! remote store is contacted. The remote commit then runs through the retry
//! combinator; each attempt first checks that its queue generation is still
//! current, so a superseded change never reaches the remote store.

use chrono::Utc;
use serde_json::{json, Value};
use waypost_engine::{
    merge_fields, sanitize_for_remote, validate_id, validate_listing, Listing, PendingOp,
    SyncState,
};

use super::{now_ms, CommitStatus, SyncOrchestrator};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::retry::with_retry;

/// Why a single commit attempt did not land.
#[derive(Debug, thiserror::Error)]
enum CommitError {
    #[error("superseded by a newer change")]
    Superseded,

    #[error(transparent)]
    Remote(RemoteError),

    #[error("cannot encode record: {0}")]
    Invalid(waypost_engine::Error),
}

impl CommitError {
    fn is_retryable(&self) -> bool {
        matches!(self, CommitError::Remote(e) if e.is_transient())
    }
}

impl SyncOrchestrator {
    /// Create or replace a listing.
    ///
    /// `createdAt`/`updatedAt` are stamped only when absent. The listing is
    /// in the local cache by the time this returns, whatever the remote
    /// outcome.
    pub async fn add_record(&self, mut listing: Listing) -> SyncResult<CommitStatus> {
        self.ensure_writable("add_record")?;
        validate_listing(&listing)?;

        listing.stamp_if_missing(Utc::now());
        self.persist_and_commit(listing).await
    }

    /// Merge `patch` over the cached listing (or a fresh `{id}` when there is
    /// none) and commit the result. `null` fields in the patch are removed.
    pub async fn update_record(&self, id: &str, patch: Value) -> SyncResult<CommitStatus> {
        self.ensure_writable("update_record")?;
        validate_id(id)?;

        let mut document = match self.inner.cache.get(id).await? {
            Some(existing) => serde_json::to_value(existing)
                .map_err(|e| waypost_engine::Error::InvalidPayload(e.to_string()))?,
            None => json!({ "id": id }),
        };
        merge_fields(&mut document, patch);
        // The id is immutable; a patch cannot move the record.
        document["id"] = Value::String(id.to_string());

        let mut listing: Listing = serde_json::from_value(document)
            .map_err(|e| waypost_engine::Error::InvalidPayload(e.to_string()))?;
        listing.touch(Utc::now());
        validate_listing(&listing)?;

        self.persist_and_commit(listing).await
    }

    /// Remove a listing locally and then remotely.
    ///
    /// The local deletion is never rolled back. If the remote delete fails a
    /// delete marker stays queued and is retried on the next drain.
    pub async fn delete_record(&self, id: &str) -> SyncResult<CommitStatus> {
        self.ensure_writable("delete_record")?;
        validate_id(id)?;

        self.inner.cache.delete(id).await?;
        let generation = self.inner.queue.lock().await.enqueue(id, PendingOp::Delete);
        self.inner.states.insert(id.to_string(), SyncState::Dirty);

        if !self.remote_available() {
            tracing::debug!(id, "Remote unavailable, delete queued");
            return Ok(CommitStatus::Queued);
        }
        self.commit(id, generation).await
    }

    fn ensure_writable(&self, operation: &'static str) -> SyncResult<()> {
        if self.role().can_write() {
            Ok(())
        } else {
            tracing::warn!(operation, "Write rejected on replica");
            Err(SyncError::RoleViolation { operation })
        }
    }

    async fn persist_and_commit(&self, listing: Listing) -> SyncResult<CommitStatus> {
        let id = listing.id.clone();

        self.inner.cache.put(&listing).await?;
        let generation = self
            .inner
            .queue
            .lock()
            .await
            .enqueue(id.clone(), PendingOp::Write { listing });
        self.inner.states.insert(id.clone(), SyncState::Dirty);

        if !self.remote_available() {
            tracing::debug!(id = %id, "Remote unavailable, write queued");
            return Ok(CommitStatus::Queued);
        }
        self.commit(&id, generation).await
    }

    /// Push the queued change `generation` for `id` to the remote store.
    ///
    /// On exhaustion the entry stays queued and the last remote error is
    /// returned.
    pub(super) async fn commit(&self, id: &str, generation: u64) -> SyncResult<CommitStatus> {
        let policy = self.inner.options.backoff;
        let outcome = with_retry(
            &policy,
            "commit",
            |attempt| self.commit_attempt(id, generation, attempt),
            CommitError::is_retryable,
        )
        .await;

        match outcome {
            Ok(was_delete) => {
                if !self.inner.queue.lock().await.acknowledge(id, generation) {
                    tracing::debug!(id, generation, "Commit landed after being superseded");
                    return Ok(CommitStatus::Superseded);
                }
                if was_delete {
                    self.inner.states.remove(id);
                } else {
                    self.inner.states.insert(id.to_string(), SyncState::Clean);
                }
                tracing::debug!(id, "Committed to remote store");
                Ok(CommitStatus::Synced)
            }
            Err(CommitError::Superseded) => {
                tracing::debug!(id, generation, "Commit superseded");
                Ok(CommitStatus::Superseded)
            }
            Err(CommitError::Remote(source)) => {
                tracing::warn!(id, error = %source, "Commit failed, change stays queued");
                Err(SyncError::RemoteUnavailable {
                    id: Some(id.to_string()),
                    source,
                })
            }
            Err(CommitError::Invalid(e)) => {
                // Retrying cannot fix an unencodable record.
                self.inner.queue.lock().await.acknowledge(id, generation);
                self.inner.states.insert(id.to_string(), SyncState::Failed);
                Err(e.into())
            }
        }
    }

    /// One remote attempt. Returns whether the change was a delete.
    async fn commit_attempt(
        &self,
        id: &str,
        generation: u64,
        attempt: u32,
    ) -> Result<bool, CommitError> {
        let op = {
            let queue = self.inner.queue.lock().await;
            match queue.get(id) {
                Some(entry) if entry.generation == generation => entry.op.clone(),
                _ => return Err(CommitError::Superseded),
            }
        };
        self.inner.states.insert(id.to_string(), SyncState::Syncing);

        let result = match &op {
            PendingOp::Write { listing } => {
                let fields = sanitize_for_remote(listing).map_err(CommitError::Invalid)?;
                self.inner.remote.write(id, fields, true).await
            }
            PendingOp::Delete => self.inner.remote.delete(id).await,
        };

        match result {
            Ok(()) => Ok(op.is_delete()),
            Err(e) => {
                let attempts = self.inner.queue.lock().await.record_failure(
                    id,
                    generation,
                    now_ms(),
                    &self.inner.options.backoff,
                );
                if attempts.is_some() {
                    self.inner.states.insert(id.to_string(), SyncState::Failed);
                }
                tracing::debug!(id, attempt, error = %e, "Remote commit attempt failed");
                Err(CommitError::Remote(e))
            }
        }
    }
}
