//! Explicit handle bundle passed to every component at construction
//!
//! There are no process-wide store or cache singletons; whoever builds a
//! [`crate::Marketplace`] decides which backends it runs on.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheTier, MemoryCache, RedisCache};
use crate::config::{AppConfig, NotifierConfig};
use crate::store::{EntityStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct MarketContext {
    pub store: Arc<dyn EntityStore>,
    pub cache: Arc<dyn CacheTier>,
    /// `None`: snapshots live until invalidated
    pub cache_ttl: Option<Duration>,
    pub notifier: NotifierConfig,
}

/// Result of probing both backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub store: Result<(), String>,
    pub cache: Result<(), String>,
}

impl Health {
    /// The cache is best-effort, so only the store decides
    pub fn is_serving(&self) -> bool {
        self.store.is_ok()
    }
}

impl MarketContext {
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn CacheTier>) -> Self {
        Self {
            store,
            cache,
            cache_ttl: None,
            notifier: NotifierConfig::default(),
        }
    }

    /// Everything in process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()))
    }

    /// PostgreSQL store + Redis cache from config
    ///
    /// Fails if PostgreSQL is unreachable. An unreachable Redis only leaves
    /// the cache unavailable until it recovers.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config.postgres)
            .await
            .context("Failed to connect to PostgreSQL")?;
        // Redis being down is not fatal; only a bad URL is
        let cache = RedisCache::connect(&config.redis)
            .await
            .context("Invalid Redis configuration")?;

        Ok(Self {
            store: Arc::new(store),
            cache: Arc::new(cache),
            cache_ttl: config.redis.ttl(),
            notifier: config.notifier.clone(),
        })
    }

    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_notifier_config(mut self, notifier: NotifierConfig) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn health_check(&self) -> Health {
        let store = self.store.health_check().await.map_err(|e| e.to_string());
        let cache = self.cache.ping().await.map_err(|e| e.to_string());
        if let Err(e) = &store {
            tracing::error!(error = %e, "Store health check failed");
        }
        if let Err(e) = &cache {
            tracing::warn!(error = %e, "Cache health check failed");
        }
        Health { store, cache }
    }
}
