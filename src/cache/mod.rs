//! Cache Tier
//!
//! Best-effort key/value storage of serialized entity snapshots. Never
//! authoritative: every error here is absorbed by the accessor and degrades
//! to a store read.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache unavailable")]
    Unavailable,
}

impl From<::redis::RedisError> for CacheError {
    fn from(e: ::redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Overwrite `key`; `ttl = None` keeps the entry until deleted
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Write only if `key` holds nothing; `Ok(false)` when an entry exists
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()>;
}
