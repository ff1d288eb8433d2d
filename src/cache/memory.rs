//! In-process cache tier for tests and local runs

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{CacheError, CacheResult, CacheTier};

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Option<Instant>)>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write a raw payload, bypassing the accessor
    pub fn insert_raw(&self, key: &str, payload: &str) {
        self.entries.insert(key.to_string(), (payload.to_string(), None));
    }

    fn check(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheTier for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Ok(Some(entry.0.clone())),
            },
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        self.check()?;
        let now = Instant::now();
        let deadline = ttl.map(|ttl| now + ttl);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().1.is_some_and(|expiry| expiry <= now) {
                    entry.insert((value, deadline));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert((value, deadline));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("accounts:1", "a".into(), None).await.unwrap();
        assert_eq!(cache.get("accounts:1").await.unwrap().as_deref(), Some("a"));

        cache.delete("accounts:1").await.unwrap();
        assert!(cache.get("accounts:1").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache
            .set("listings:1", "x".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(cache.get("listings:1").await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing_entry() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("listings:1", "old".into(), None).await.unwrap());
        assert!(!cache.set_if_absent("listings:1", "newer".into(), None).await.unwrap());
        assert_eq!(cache.get("listings:1").await.unwrap().as_deref(), Some("old"));

        // An expired entry counts as absent
        cache
            .set("listings:2", "x".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(cache.set_if_absent("listings:2", "y".into(), None).await.unwrap());
        assert_eq!(cache.get("listings:2").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_outage_mode() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.get("accounts:1").await,
            Err(CacheError::Unavailable)
        ));
        assert!(cache.ping().await.is_err());

        cache.set_unavailable(false);
        assert!(cache.ping().await.is_ok());
    }
}
