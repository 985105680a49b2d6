//! In-process remote store.
//!
//! Behaves like a hosted document collection: merge writes, creation-order
//! listing and realtime broadcast to subscribers. Availability can be
//! toggled and write failures injected, so the orchestrator's offline and
//! retry behaviour can be driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;
use waypost_engine::{merge_fields, RawDocument, RecordId, RemoteSnapshot};

use super::{RemoteResult, RemoteStore, Subscription};
use crate::error::RemoteError;

/// A mutation the store accepted, in the order it was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Write { id: RecordId, fields: Value, merge: bool },
    Delete { id: RecordId },
}

impl RemoteCall {
    pub fn id(&self) -> &str {
        match self {
            RemoteCall::Write { id, .. } | RemoteCall::Delete { id } => id,
        }
    }
}

#[derive(Debug)]
struct StoredDocument {
    seq: u64,
    data: Value,
}

#[derive(Debug, Default)]
struct Collection {
    documents: HashMap<RecordId, StoredDocument>,
    next_seq: u64,
}

impl Collection {
    fn ordered(&self) -> Vec<RawDocument> {
        let mut docs: Vec<(&u64, RawDocument)> = self
            .documents
            .iter()
            .map(|(id, doc)| (&doc.seq, RawDocument::new(id.clone(), doc.data.clone())))
            .collect();
        docs.sort_by_key(|(seq, _)| **seq);
        docs.into_iter().map(|(_, doc)| doc).collect()
    }

    fn upsert(&mut self, id: &str, fields: Value, merge: bool) {
        match self.documents.get_mut(id) {
            Some(existing) if merge => merge_fields(&mut existing.data, fields),
            Some(existing) => existing.data = fields,
            None => {
                self.next_seq += 1;
                self.documents.insert(
                    id.to_string(),
                    StoredDocument {
                        seq: self.next_seq,
                        data: fields,
                    },
                );
            }
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::UnboundedSender<RemoteSnapshot>,
    last: Vec<RawDocument>,
}

/// In-memory [`RemoteStore`].
#[derive(Debug)]
pub struct MemoryRemote {
    collection: Mutex<Collection>,
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
    available: AtomicBool,
    failing_writes: AtomicU32,
    attempts: AtomicUsize,
    log: Mutex<Vec<RemoteCall>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            collection: Mutex::new(Collection::default()),
            subscribers: Arc::new(DashMap::new()),
            available: AtomicBool::new(true),
            failing_writes: AtomicU32::new(0),
            attempts: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with `documents`, in creation order.
    pub async fn with_documents(documents: impl IntoIterator<Item = RawDocument>) -> Self {
        let remote = Self::new();
        {
            let mut collection = remote.collection.lock().await;
            for doc in documents {
                collection.upsert(&doc.id, doc.data, false);
            }
        }
        remote
    }

    /// Simulate the store going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Make the next `n` writes or deletes fail as unreachable.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Mutations applied so far.
    pub async fn write_log(&self) -> Vec<RemoteCall> {
        self.log.lock().await.clone()
    }

    /// Write and delete attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn document(&self, id: &str) -> Option<Value> {
        self.collection
            .lock()
            .await
            .documents
            .get(id)
            .map(|d| d.data.clone())
    }

    pub async fn len(&self) -> usize {
        self.collection.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Replace a document as another writer would, notifying subscribers.
    /// Ignores availability.
    pub async fn insert_document(&self, id: &str, data: Value) {
        let mut collection = self.collection.lock().await;
        collection.upsert(id, data, false);
        self.broadcast(&collection);
    }

    /// Remove a document as another writer would, notifying subscribers.
    pub async fn remove_document(&self, id: &str) {
        let mut collection = self.collection.lock().await;
        if collection.documents.remove(id).is_some() {
            self.broadcast(&collection);
        }
    }

    fn ensure_available(&self) -> RemoteResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory remote is offline".into()))
        }
    }

    fn begin_mutation(&self) -> RemoteResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RemoteError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    /// Push the current state to every subscriber that saw a change.
    /// Subscribers whose receiver is gone are dropped.
    fn broadcast(&self, collection: &Collection) {
        let documents = collection.ordered();
        self.subscribers.retain(|_, sub| {
            let snapshot = RemoteSnapshot::from_transition(&sub.last, documents.clone());
            if snapshot.changes.is_empty() {
                return true;
            }
            sub.last = documents.clone();
            sub.tx.send(snapshot).is_ok()
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<RawDocument>> {
        self.ensure_available()?;
        Ok(self.collection.lock().await.ordered())
    }

    async fn subscribe(&self) -> RemoteResult<Subscription> {
        self.ensure_available()?;

        let collection = self.collection.lock().await;
        let documents = collection.ordered();
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still in scope, so this cannot fail.
        let _ = tx.send(RemoteSnapshot::initial(documents.clone()));

        let key = Uuid::new_v4();
        self.subscribers.insert(
            key,
            Subscriber {
                tx,
                last: documents,
            },
        );
        drop(collection);

        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(rx, move || {
            subscribers.remove(&key);
        }))
    }

    async fn write(&self, id: &str, fields: Value, merge: bool) -> RemoteResult<()> {
        self.begin_mutation()?;

        let mut collection = self.collection.lock().await;
        collection.upsert(id, fields.clone(), merge);
        self.log.lock().await.push(RemoteCall::Write {
            id: id.to_string(),
            fields,
            merge,
        });
        self.broadcast(&collection);
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.begin_mutation()?;

        let mut collection = self.collection.lock().await;
        let existed = collection.documents.remove(id).is_some();
        self.log.lock().await.push(RemoteCall::Delete { id: id.to_string() });
        if existed {
            self.broadcast(&collection);
        }
        Ok(())
    }
}
