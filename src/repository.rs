//! Cache-Aside Accessor
//!
//! Reads try the cache tier, fall back to the store, then repopulate the
//! cache. Writes hit the store first and only a committed state ever reaches
//! the cache. The cache is never allowed to fail a call: every cache error is
//! logged and treated as a miss.
//!
//! Read-path population only fills an empty key. A reader that fetched a row
//! before a concurrent write committed cannot overwrite the writer's fresher
//! snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::CacheTier;
use crate::entity::{Account, Entity, EntityKind, ExternalId};
use crate::error::MarketResult;
use crate::store::EntityStore;

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the accessor's cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Cache calls that failed or returned an undecodable payload
    pub errors: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

pub struct EntityRepository {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn CacheTier>,
    ttl: Option<Duration>,
    counters: CacheCounters,
}

impl EntityRepository {
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn CacheTier>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Cache first, store on miss
    pub async fn get(&self, kind: EntityKind, id: i64) -> MarketResult<Option<Entity>> {
        if let Some(entity) = self.cached(kind, id).await {
            return Ok(Some(entity));
        }

        let entity = self.store.fetch(kind, id).await?;
        if let Some(entity) = &entity {
            self.populate_if_absent(entity).await;
        }
        Ok(entity)
    }

    /// Write to the store, then overwrite the cache with the stored state
    pub async fn upsert(&self, entity: Entity) -> MarketResult<Entity> {
        let stored = self.store.save(entity).await?;
        self.populate(&stored).await;
        Ok(stored)
    }

    /// Evict, then delete from the store
    ///
    /// Rows cascaded or nullified by the delete are evicted as well.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> MarketResult<bool> {
        self.invalidate(kind, id).await;

        let touched = self.store.remove(kind, id).await?;
        for (kind, id) in touched.iter().skip(1) {
            self.invalidate(*kind, *id).await;
        }
        Ok(!touched.is_empty())
    }

    /// Secondary-index lookup; the identity mapping itself is not cached
    pub async fn find_account_by_identity(
        &self,
        external_id: ExternalId,
    ) -> MarketResult<Option<Account>> {
        let account = self.store.account_by_identity(external_id).await?;
        if let Some(account) = &account {
            self.populate_if_absent(&Entity::Account(account.clone()))
                .await;
        }
        Ok(account)
    }

    /// Publish freshly committed rows
    pub async fn refresh<I>(&self, entities: I)
    where
        I: IntoIterator<Item = Entity>,
    {
        for entity in entities {
            self.populate(&entity).await;
        }
    }

    /// Drop every listed entry before a store mutation
    ///
    /// If the caller abandons the operation after commit but before the
    /// refresh, readers see a miss instead of the pre-commit snapshot.
    pub async fn invalidate_all<I>(&self, keys: I)
    where
        I: IntoIterator<Item = (EntityKind, i64)>,
    {
        for (kind, id) in keys {
            self.invalidate(kind, id).await;
        }
    }

    /// Drop one cache entry
    pub async fn invalidate(&self, kind: EntityKind, id: i64) {
        let key = kind.cache_key(id);
        match self.cache.delete(&key).await {
            Ok(()) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
            }
        }
    }

    async fn cached(&self, kind: EntityKind, id: i64) -> Option<Entity> {
        let key = kind.cache_key(id);
        match self.cache.get(&key).await {
            Ok(Some(payload)) => match kind.decode(&payload) {
                Ok(entity) if entity.id() == id => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Some(entity)
                }
                Ok(entity) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, found = entity.id(), "Cached snapshot has wrong id");
                    self.invalidate(kind, id).await;
                    None
                }
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "Failed to decode cached snapshot");
                    self.invalidate(kind, id).await;
                    None
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Cache read failed, using store");
                None
            }
        }
    }

    async fn populate(&self, entity: &Entity) {
        let key = entity.cache_key();
        let payload = match entity.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(key = %key, error = %e, "Failed to encode snapshot");
                return;
            }
        };

        match self.cache.set(&key, payload, self.ttl).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                // A stale snapshot may still sit under this key
                if let Err(e) = self.cache.delete(&key).await {
                    tracing::warn!(key = %key, error = %e, "Cache delete failed");
                }
            }
        }
    }

    /// Read-path fill: never replaces an existing entry
    async fn populate_if_absent(&self, entity: &Entity) {
        let key = entity.cache_key();
        let payload = match entity.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(key = %key, error = %e, "Failed to encode snapshot");
                return;
            }
        };

        match self.cache.set_if_absent(&key, payload, self.ttl).await {
            Ok(true) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                tracing::debug!(key = %key, "Newer snapshot already cached");
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Cache fill failed");
            }
        }
    }
}
