use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Overrides `postgres.url`
pub const DATABASE_URL_ENV: &str = "MARKET_DATABASE_URL";
/// Overrides `redis.url`
pub const REDIS_URL_ENV: &str = "MARKET_REDIS_URL";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    16
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Snapshot expiry; entries live until invalidated when absent
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_op_timeout_ms() -> u64 {
    250
}

impl RedisConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Counterparty notification delivery
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifierConfig {
    /// Attempts per message, transient failures only
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl NotifierConfig {
    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply environment overrides
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.postgres.url = url;
        }
        if let Some(url) = lookup(REDIS_URL_ENV) {
            self.redis.url = url;
        }
    }
}
