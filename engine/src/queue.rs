//! Pending write queue.
//!
//! The queue is a single mapping from record id to the latest unacknowledged
//! change for that id. Enqueueing an id that is already present replaces the
//! entry and bumps its generation, so a commit that started for an older
//! generation can tell it has been superseded.

use crate::{Listing, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Retry budget and exponential backoff schedule for remote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Attempts per commit before the entry is parked in the queue
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// Delay to wait after `failures` consecutive failures (100, 200, 400 ms
    /// with the default policy). Zero failures means no delay.
    pub fn delay_after(&self, failures: u32) -> u64 {
        if failures == 0 {
            return 0;
        }
        let shift = (failures - 1).min(32);
        self.base_delay_ms.saturating_mul(1u64 << shift)
    }

    /// Whether `attempts` has used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Sync state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Local copy matches the last known remote copy
    Clean,
    /// Persisted locally, remote commit not yet attempted
    Dirty,
    /// Remote commit in flight
    Syncing,
    /// Last remote commit failed; waiting for a retry
    Failed,
}

/// The change a pending entry will commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PendingOp {
    /// Upsert the listing remotely
    Write { listing: Listing },
    /// Remove the document remotely
    Delete,
}

impl PendingOp {
    pub fn is_delete(&self) -> bool {
        matches!(self, PendingOp::Delete)
    }

    pub fn listing(&self) -> Option<&Listing> {
        match self {
            PendingOp::Write { listing } => Some(listing),
            PendingOp::Delete => None,
        }
    }
}

/// An unacknowledged change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub id: RecordId,
    pub op: PendingOp,
    /// Failed remote attempts for this generation
    pub attempts: u32,
    /// Earliest time a retry is scheduled for (milliseconds since epoch)
    pub next_retry_at: Option<Timestamp>,
    /// Increases every time the entry is replaced
    pub generation: u64,
}

/// The in-memory queue of pending remote commits.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: BTreeMap<RecordId, PendingEntry>,
    next_generation: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`. Returns the new generation.
    pub fn enqueue(&mut self, id: impl Into<RecordId>, op: PendingOp) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let id = id.into();

        self.entries.insert(
            id.clone(),
            PendingEntry {
                id,
                op,
                attempts: 0,
                next_retry_at: None,
                generation,
            },
        );

        generation
    }

    pub fn get(&self, id: &str) -> Option<&PendingEntry> {
        self.entries.get(id)
    }

    /// Whether `generation` is still the latest change queued for `id`.
    pub fn is_current(&self, id: &str, generation: u64) -> bool {
        self.entries
            .get(id)
            .is_some_and(|e| e.generation == generation)
    }

    /// Record a failed attempt for the current generation.
    ///
    /// Returns the updated attempt count, or `None` if the entry was
    /// superseded or acknowledged in the meantime.
    pub fn record_failure(
        &mut self,
        id: &str,
        generation: u64,
        now: Timestamp,
        policy: &BackoffPolicy,
    ) -> Option<u32> {
        let entry = self
            .entries
            .get_mut(id)
            .filter(|e| e.generation == generation)?;

        entry.attempts += 1;
        entry.next_retry_at = Some(now.saturating_add(policy.delay_after(entry.attempts)));
        Some(entry.attempts)
    }

    /// Remove the entry if `generation` is still current.
    pub fn acknowledge(&mut self, id: &str, generation: u64) -> bool {
        if self.is_current(id, generation) {
            self.entries.remove(id);
            true
        } else {
            false
        }
    }

    /// Reset attempt counters so that parked entries get a fresh budget.
    pub fn reset_attempts(&mut self) {
        for entry in self.entries.values_mut() {
            entry.attempts = 0;
            entry.next_retry_at = None;
        }
    }

    /// Copy of every entry, ordered by id.
    pub fn entries(&self) -> Vec<PendingEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(id: &str, title: &str) -> PendingOp {
        PendingOp::Write {
            listing: Listing::new(id, title),
        }
    }

    #[test]
    fn default_backoff_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(0), 0);
        assert_eq!(policy.delay_after(1), 100);
        assert_eq!(policy.delay_after(2), 200);
        assert_eq!(policy.delay_after(3), 400);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn backoff_saturates() {
        let policy = BackoffPolicy::new(100, u64::MAX / 2);
        assert_eq!(policy.delay_after(90), u64::MAX);
    }

    #[test]
    fn enqueue_replaces_same_id() {
        let mut queue = PendingQueue::new();
        let first = queue.enqueue("P1", write("P1", "A"));
        let second = queue.enqueue("P1", write("P1", "B"));

        assert_eq!(queue.len(), 1);
        assert!(second > first);
        assert!(!queue.is_current("P1", first));
        assert_eq!(
            queue.get("P1").unwrap().op.listing().unwrap().title,
            "B"
        );
    }

    #[test]
    fn superseded_generation_cannot_acknowledge() {
        let mut queue = PendingQueue::new();
        let stale = queue.enqueue("P1", write("P1", "A"));
        let fresh = queue.enqueue("P1", write("P1", "B"));

        assert!(!queue.acknowledge("P1", stale));
        assert!(queue.get("P1").is_some());
        assert!(queue.acknowledge("P1", fresh));
        assert!(queue.is_empty());
    }

    #[test]
    fn failures_schedule_retries() {
        let policy = BackoffPolicy::default();
        let mut queue = PendingQueue::new();
        let generation = queue.enqueue("P1", write("P1", "A"));

        assert_eq!(queue.record_failure("P1", generation, 1_000, &policy), Some(1));
        assert_eq!(queue.get("P1").unwrap().next_retry_at, Some(1_100));
        assert_eq!(queue.record_failure("P1", generation, 2_000, &policy), Some(2));
        assert_eq!(queue.get("P1").unwrap().next_retry_at, Some(2_200));

        assert_eq!(queue.record_failure("P1", generation + 1, 3_000, &policy), None);
        assert_eq!(queue.record_failure("missing", 1, 3_000, &policy), None);
    }

    #[test]
    fn replacing_resets_attempts() {
        let policy = BackoffPolicy::default();
        let mut queue = PendingQueue::new();
        let generation = queue.enqueue("P1", write("P1", "A"));
        queue.record_failure("P1", generation, 0, &policy);

        queue.enqueue("P1", PendingOp::Delete);
        let entry = queue.get("P1").unwrap();
        assert_eq!(entry.attempts, 0);
        assert!(entry.op.is_delete());
    }

    #[test]
    fn reset_attempts_clears_schedule() {
        let policy = BackoffPolicy::default();
        let mut queue = PendingQueue::new();
        let generation = queue.enqueue("P1", write("P1", "A"));
        queue.record_failure("P1", generation, 0, &policy);

        queue.reset_attempts();
        let entry = queue.get("P1").unwrap();
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.next_retry_at, None);
    }

    #[test]
    fn entries_are_ordered_by_id() {
        let mut queue = PendingQueue::new();
        queue.enqueue("b", PendingOp::Delete);
        queue.enqueue("a", write("a", "A"));
        let ids: Vec<_> = queue.entries().into_iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
