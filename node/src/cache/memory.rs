//! In-memory cache backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::RwLock;
use waypost_engine::{Listing, RecordId};

use super::{CacheResult, LocalCache};
use crate::error::CacheError;

/// Process-local cache. Contents do not survive a restart.
///
/// Ids registered with [`MemoryCache::fail_for`] make `put` and `delete`
/// fail, which lets callers exercise per-record error isolation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: RwLock<BTreeMap<RecordId, Listing>>,
    failing: DashSet<RecordId>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with `listings`.
    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let records = listings.into_iter().map(|l| (l.id.clone(), l)).collect();
        Self {
            records: RwLock::new(records),
            failing: DashSet::new(),
        }
    }

    /// Make writes for `id` fail until [`MemoryCache::recover`] is called.
    pub fn fail_for(&self, id: impl Into<RecordId>) {
        self.failing.insert(id.into());
    }

    pub fn recover(&self, id: &str) {
        self.failing.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check(&self, id: &str) -> CacheResult<()> {
        if self.failing.contains(id) {
            return Err(CacheError::Unavailable(format!("write to '{id}' failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get_all(&self) -> CacheResult<Vec<Listing>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Listing>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, listing: &Listing) -> CacheResult<()> {
        self.check(&listing.id)?;
        self.records
            .write()
            .await
            .insert(listing.id.clone(), listing.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> CacheResult<()> {
        self.check(id)?;
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn ids(&self) -> CacheResult<Vec<RecordId>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}
