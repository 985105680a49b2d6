//! Local cache store.
//!
//! A durable, process-local key-value store of listings keyed by id. `put`
//! overwrites without merging; merging happens in the orchestrator before a
//! listing reaches the cache. Every operation is durable before it returns.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use waypost_engine::{Listing, RecordId};

use crate::error::CacheError;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Durable local storage for listings.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// All cached listings, ordered by id.
    async fn get_all(&self) -> CacheResult<Vec<Listing>>;

    async fn get(&self, id: &str) -> CacheResult<Option<Listing>>;

    /// Insert or overwrite the listing with the same id.
    async fn put(&self, listing: &Listing) -> CacheResult<()>;

    /// Remove a listing. Removing a missing id is not an error.
    async fn delete(&self, id: &str) -> CacheResult<()>;

    async fn clear(&self) -> CacheResult<()>;

    /// Ids of every cached listing, ordered.
    async fn ids(&self) -> CacheResult<Vec<RecordId>> {
        Ok(self.get_all().await?.into_iter().map(|l| l.id).collect())
    }
}
