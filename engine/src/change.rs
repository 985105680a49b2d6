//! Remote change model.
//!
//! A remote snapshot carries the full ordered document set plus the
//! per-document changes relative to the previous snapshot of the same
//! subscription.

use crate::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A document as the remote store returns it, before sanitizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    /// Document key in the remote collection
    pub id: RecordId,
    /// Document fields
    pub data: serde_json::Value,
}

impl RawDocument {
    pub fn new(id: impl Into<RecordId>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// How a document changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One per-document change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub kind: ChangeKind,
    /// The document after the change, or the last known copy for removals
    pub document: RawDocument,
}

/// A full snapshot delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    /// All documents, ordered by creation
    pub documents: Vec<RawDocument>,
    /// Changes relative to the previous snapshot
    pub changes: Vec<DocumentChange>,
}

impl RemoteSnapshot {
    /// Build a snapshot from an ordered document set and the set that
    /// preceded it.
    pub fn from_transition(previous: &[RawDocument], documents: Vec<RawDocument>) -> Self {
        let changes = diff_snapshots(previous, &documents);
        Self { documents, changes }
    }

    /// The first snapshot of a subscription: every document is `added`.
    pub fn initial(documents: Vec<RawDocument>) -> Self {
        Self::from_transition(&[], documents)
    }

    /// Ids of every document in the snapshot.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.documents.iter().map(|d| &d.id)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Classify the differences between two ordered document sets.
///
/// Added and modified documents appear in `next` order, followed by removed
/// documents in `previous` order.
pub fn diff_snapshots(previous: &[RawDocument], next: &[RawDocument]) -> Vec<DocumentChange> {
    let before: HashMap<&str, &RawDocument> =
        previous.iter().map(|d| (d.id.as_str(), d)).collect();
    let after: HashMap<&str, &RawDocument> = next.iter().map(|d| (d.id.as_str(), d)).collect();

    let mut changes = Vec::new();

    for doc in next {
        match before.get(doc.id.as_str()) {
            None => changes.push(DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            }),
            Some(old) if old.data != doc.data => changes.push(DocumentChange {
                kind: ChangeKind::Modified,
                document: doc.clone(),
            }),
            Some(_) => {}
        }
    }

    for doc in previous {
        if !after.contains_key(doc.id.as_str()) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                document: doc.clone(),
            });
        }
    }

    changes
}
