//! # Waypost Engine
//!
//! The deterministic core of the Waypost listing sync engine.
//!
//! Waypost keeps a durable local cache of listings consistent with a remote,
//! authoritative document store across unreliable connectivity. This crate
//! holds the parts of that engine that need no IO: the listing model, input
//! validation, sanitizing, role detection, snapshot diffing, reconciliation
//! planning, and the pending write queue. The async host (`waypost-node`)
//! drives these against real stores.
//!
//! ## Design Principles
//!
//! - **No IO**: nothing here touches files, sockets, or clocks; time is
//!   passed in as milliseconds since epoch
//! - **Deterministic**: the same inputs always produce the same plans
//! - **Testable**: pure functions and plain data
//!
//! ## Core Concepts
//!
//! ### Listings
//!
//! A [`Listing`] is the synchronized record: an immutable id, a required
//! title, and optional descriptive fields declared once on the struct.
//! Unknown fields are carried through untouched.
//!
//! ### Roles
//!
//! [`NodeRole::Primary`] nodes originate writes. [`NodeRole::Replica`] nodes
//! mirror the remote store and never write.
//!
//! ### Sanitizing
//!
//! [`clean`] strips absent values before a remote write.
//! [`MediaResolver`] turns root-relative media paths into absolute references.
//!
//! ### Reconciliation
//!
//! [`plan_bootstrap`] and [`plan_snapshot`] decide what to upload, accept, and
//! discard. [`diff_snapshots`] classifies document changes for adapters that
//! only see full collections.
//!
//! ### Pending queue
//!
//! [`PendingQueue`] keeps the latest unacknowledged change per id, and
//! [`BackoffPolicy`] spaces out retries.
//!
//! ## Quick Start
//!
//! ```rust
//! use waypost_engine::{plan_bootstrap, validate_listing, Listing, NodeRole};
//!
//! let role = NodeRole::detect("localhost:5173", ["localhost", "127.0.0.1"]);
//! assert_eq!(role, NodeRole::Primary);
//!
//! let local = vec![Listing::new("P1", "Loft by the river")];
//! validate_listing(&local[0]).unwrap();
//!
//! let plan = plan_bootstrap(role, &local, &[]);
//! assert_eq!(plan.upload.len(), 1);
//! ```

pub mod change;
pub mod error;
pub mod queue;
pub mod reconcile;
pub mod record;
pub mod role;
pub mod sanitize;
pub mod validate;

// Re-export main types at crate root
pub use change::{diff_snapshots, ChangeKind, DocumentChange, RawDocument, RemoteSnapshot};
pub use error::Error;
pub use queue::{BackoffPolicy, PendingEntry, PendingOp, PendingQueue, SyncState};
pub use reconcile::{plan_bootstrap, plan_snapshot, BootstrapPlan, SnapshotPlan};
pub use record::{Address, Contact, GeoPoint, Listing, Price};
pub use role::NodeRole;
pub use sanitize::{
    clean, is_root_relative, listing_from_remote, merge_fields, sanitize_for_remote, MediaResolver,
};
pub use validate::{validate_id, validate_listing, MAX_ID_LEN};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = u64;
