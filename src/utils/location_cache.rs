use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;

use crate::model::location::{Location, LocationPatch, NewLocation};
use crate::store::{LocationRegistry, StoreResult};

/// Read-through cache in front of a [`LocationRegistry`].
///
/// Every write goes to the inner registry first and then evicts the cached entry, so a
/// deactivated geofence stops accepting check-ins immediately in this process.
///
/// A miss may load the row just before a concurrent write lands. Writes bump
/// `generation` before evicting and a loader that sees a bump after its insert evicts
/// its own entry, so a pre-write row never stays cached.
pub struct CachedLocationRegistry {
    inner: Arc<dyn LocationRegistry>,
    cache: Cache<u64, Location>,
    generation: AtomicU64,
}

impl CachedLocationRegistry {
    pub fn new(inner: Arc<dyn LocationRegistry>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(10_000) // geofences are few; tune if not
                .time_to_live(ttl)
                .build(),
            generation: AtomicU64::new(0),
        }
    }

    async fn evict(&self, id: u64) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(&id).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Batch load locations into the cache
    async fn batch_insert(&self, locations: Vec<Location>) {
        let futures: Vec<_> = locations
            .into_iter()
            .map(|l| self.cache.insert(l.id, l))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;
    }

    /// Load all active locations into the in-memory cache
    pub async fn warmup(&self) -> Result<usize> {
        let active = self.inner.list_active().await?;
        let total = active.len();

        self.batch_insert(active).await;
        self.cache.run_pending_tasks().await;

        tracing::info!(total, "Location cache warmup complete");
        Ok(total)
    }
}

#[async_trait]
impl LocationRegistry for CachedLocationRegistry {
    async fn get(&self, id: u64) -> StoreResult<Option<Location>> {
        if let Some(hit) = self.cache.get(&id).await {
            return Ok(Some(hit));
        }

        let seen = self.generation.load(Ordering::SeqCst);
        let found = self.inner.get(id).await?;
        if let Some(location) = &found {
            self.cache.insert(id, location.clone()).await;
            if self.generation.load(Ordering::SeqCst) != seen {
                self.cache.invalidate(&id).await;
            }
        }
        Ok(found)
    }

    async fn list_active(&self) -> StoreResult<Vec<Location>> {
        self.inner.list_active().await
    }

    async fn create(&self, new: NewLocation) -> StoreResult<Location> {
        let location = self.inner.create(new).await?;
        self.cache.insert(location.id, location.clone()).await;
        Ok(location)
    }

    async fn update(&self, id: u64, patch: LocationPatch) -> StoreResult<Option<Location>> {
        let updated = self.inner.update(id, patch).await?;
        self.evict(id).await;
        Ok(updated)
    }

    async fn deactivate(&self, id: u64) -> StoreResult<bool> {
        let removed = self.inner.deactivate(id).await?;
        self.evict(id).await;
        Ok(removed)
    }
}
