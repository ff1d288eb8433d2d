//! Redis cache tier
//!
//! One `ConnectionManager` (auto-reconnecting, cheap to clone) shared by all
//! callers. Every command is bounded by `op_timeout`.
//!
//! The manager is created lazily. If Redis is down at startup the cache
//! answers [`CacheError::Unavailable`] and a new connection is attempted at
//! most once per [`RECONNECT_INTERVAL`].

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{CacheError, CacheResult, CacheTier};
use crate::config::RedisConfig;

/// Minimum pause between connection attempts while Redis is unreachable
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ConnectionSlot {
    manager: Option<ConnectionManager>,
    last_attempt: Option<Instant>,
}

pub struct RedisCache {
    client: redis::Client,
    slot: Mutex<ConnectionSlot>,
    op_timeout: Duration,
}

impl RedisCache {
    pub fn new(client: redis::Client, op_timeout: Duration) -> Self {
        Self {
            client,
            slot: Mutex::new(ConnectionSlot::default()),
            op_timeout,
        }
    }

    /// Only a malformed URL fails here; an unreachable server does not
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let cache = Self::new(client, Duration::from_millis(config.op_timeout_ms));

        if let Err(e) = cache.connection().await {
            tracing::warn!(
                error = %e,
                retry_in = ?RECONNECT_INTERVAL,
                "Redis unreachable at startup, serving from the store"
            );
        }
        Ok(cache)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let mut slot = self.slot.lock().await;
        if let Some(manager) = &slot.manager {
            return Ok(manager.clone());
        }
        if slot
            .last_attempt
            .is_some_and(|at| at.elapsed() < RECONNECT_INTERVAL)
        {
            return Err(CacheError::Unavailable);
        }

        slot.last_attempt = Some(Instant::now());
        let manager = tokio::time::timeout(
            self.op_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.op_timeout))??;

        tracing::info!("Redis connection manager established");
        slot.manager = Some(manager.clone());
        Ok(manager)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CacheTier for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                self.bounded(conn.set_ex::<_, _, ()>(key, value, secs)).await
            }
            None => self.bounded(conn.set::<_, _, ()>(key, value)).await,
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let reply: Option<String> = self
            .bounded(async move { cmd.query_async(&mut conn).await })
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        self.bounded(conn.del::<_, ()>(key)).await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        tracing::debug!(reply = %pong, "Redis ping");
        Ok(())
    }
}
