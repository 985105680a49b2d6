//! Remote store adapter.
//!
//! Wraps the authoritative document collection. Adapters translate
//! transport failures into [`RemoteError`] and never retry on their own;
//! retry policy belongs to the orchestrator.

mod http;
mod memory;
mod subscription;

pub use http::{HttpRemote, HttpRemoteConfig};
pub use memory::{MemoryRemote, RemoteCall};
pub use subscription::Subscription;

use async_trait::async_trait;
use serde_json::Value;
use waypost_engine::RawDocument;

use crate::error::RemoteError;

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The authoritative document collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Every document, ordered by creation.
    async fn fetch_all(&self) -> RemoteResult<Vec<RawDocument>>;

    /// Open a standing subscription. The first snapshot reports every
    /// document as added.
    async fn subscribe(&self) -> RemoteResult<Subscription>;

    /// Write `fields` to document `id`. With `merge` the fields are merged
    /// into an existing document instead of replacing it.
    async fn write(&self, id: &str, fields: Value, merge: bool) -> RemoteResult<()>;

    /// Remove document `id`. Removing a missing document succeeds.
    async fn delete(&self, id: &str) -> RemoteResult<()>;
}
