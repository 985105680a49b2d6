//! Reconciliation planning.
//!
//! Given what the local cache holds and what the remote store reports, these
//! functions decide which records to upload, accept, and discard. They do no
//! IO; the orchestrator carries out the plan and isolates per-record
//! failures.
//!
//! # Bootstrap
//!
//! - Primary: upload local-only records, accept every remote record. Both
//!   stores converge to the union. An empty remote makes this a plain
//!   bootstrap upload.
//! - Replica: accept every remote record and discard local records the remote
//!   does not have. A replica never originates data, so a local-only record
//!   is stale.
//!
//! # Snapshots
//!
//! `added`/`modified` changes become upserts and `removed` changes become
//! removals. A replica also sweeps every local id absent from the snapshot,
//! which covers change events it may have missed.

use crate::{ChangeKind, Listing, NodeRole, RawDocument, RecordId, RemoteSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// What startup reconciliation should do.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPlan {
    /// Local records to push to the remote store
    pub upload: Vec<Listing>,
    /// Remote records to write into the local cache
    pub accept: Vec<Listing>,
    /// Local ids to delete from the local cache
    pub discard: Vec<RecordId>,
}

/// Plan startup reconciliation between the local cache and the remote set.
pub fn plan_bootstrap(role: NodeRole, local: &[Listing], remote: &[Listing]) -> BootstrapPlan {
    let remote_ids: HashSet<&str> = remote.iter().map(|l| l.id.as_str()).collect();

    match role {
        NodeRole::Primary => BootstrapPlan {
            upload: local
                .iter()
                .filter(|l| !remote_ids.contains(l.id.as_str()))
                .cloned()
                .collect(),
            accept: remote.to_vec(),
            discard: Vec::new(),
        },
        NodeRole::Replica => BootstrapPlan {
            upload: Vec::new(),
            accept: remote.to_vec(),
            discard: local
                .iter()
                .filter(|l| !remote_ids.contains(l.id.as_str()))
                .map(|l| l.id.clone())
                .collect(),
        },
    }
}

/// What applying one remote snapshot should do.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPlan {
    /// Added or modified documents to write into the local cache
    pub upserts: Vec<RawDocument>,
    /// Ids the snapshot reported as removed
    pub removals: Vec<RecordId>,
    /// Local ids absent from the snapshot (replicas only)
    pub sweep: Vec<RecordId>,
}

/// Plan how to apply `snapshot` given the ids currently in the local cache.
pub fn plan_snapshot<'a, I>(role: NodeRole, local_ids: I, snapshot: &RemoteSnapshot) -> SnapshotPlan
where
    I: IntoIterator<Item = &'a RecordId>,
{
    let mut plan = SnapshotPlan::default();

    for change in &snapshot.changes {
        match change.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                plan.upserts.push(change.document.clone());
            }
            ChangeKind::Removed => plan.removals.push(change.document.id.clone()),
        }
    }

    if role == NodeRole::Replica {
        let remote_ids: HashSet<&str> = snapshot.ids().map(String::as_str).collect();
        let removed: HashSet<&str> = plan.removals.iter().map(String::as_str).collect();
        let local: BTreeSet<&RecordId> = local_ids.into_iter().collect();

        plan.sweep = local
            .into_iter()
            .filter(|id| !remote_ids.contains(id.as_str()) && !removed.contains(id.as_str()))
            .cloned()
            .collect();
    }

    plan
}
