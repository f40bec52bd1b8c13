use std::time::Duration;

use medreg_store_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    /// Redis configuration (cache snapshots and stream queues)
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache lifetimes
    #[serde(default)]
    pub cache: CacheSettings,
    /// Queue names and consumer group identity
    #[serde(default)]
    pub queues: QueueConfig,
    /// Asset service endpoint for picture cleanup
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default derived via field defaults

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cache validations
        if self.cache.list_ttl_secs == 0 {
            return Err("cache.list_ttl_secs must be > 0".into());
        }
        if self.cache.record_ttl_secs == 0 {
            return Err("cache.record_ttl_secs must be > 0".into());
        }
        // Store validation - Postgres settings only matter for that backend
        if self.store.backend == StoreBackend::Postgres {
            self.store.postgres.validate()?;
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        // Queue validation
        if self.queues.device.is_empty()
            || self.queues.legacy.is_empty()
            || self.queues.inbound.is_empty()
        {
            return Err("queue names must not be empty".into());
        }
        if self.queues.group.is_empty() || self.queues.consumer.is_empty() {
            return Err("queues.group and queues.consumer must not be empty".into());
        }
        Ok(())
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.list_ttl_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.record_ttl_secs)
    }
}

/// Record store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Which backend holds the registry records
    /// Default: "memory" (single-instance development)
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL settings, used when backend = "postgres"
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (disabled for single-instance deployments)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// List snapshot TTL in seconds
    #[serde(default = "default_list_ttl_secs")]
    pub list_ttl_secs: u64,

    /// Single-record snapshot TTL in seconds
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,
}

fn default_list_ttl_secs() -> u64 {
    36_000 // 10 hours
}

fn default_record_ttl_secs() -> u64 {
    86_400 // 24 hours
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            list_ttl_secs: default_list_ttl_secs(),
            record_ttl_secs: default_record_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Stream receiving hospital, user and standard-ward announcements
    #[serde(default = "default_device_queue")]
    pub device: String,

    /// Stream receiving legacy-ward announcements
    #[serde(default = "default_legacy_queue")]
    pub legacy: String,

    /// Stream this instance consumes remote mutations from
    #[serde(default = "default_inbound_queue")]
    pub inbound: String,

    /// Consumer group name on the inbound stream
    #[serde(default = "default_queue_group")]
    pub group: String,

    /// Consumer name within the group, unique per instance
    #[serde(default = "default_queue_consumer")]
    pub consumer: String,
}

fn default_device_queue() -> String {
    medreg_notify::DEVICE_QUEUE.to_string()
}

fn default_legacy_queue() -> String {
    medreg_notify::LEGACY_QUEUE.to_string()
}

fn default_inbound_queue() -> String {
    medreg_notify::INBOUND_QUEUE.to_string()
}

fn default_queue_group() -> String {
    "medreg".to_string()
}

fn default_queue_consumer() -> String {
    "medreg-1".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            device: default_device_queue(),
            legacy: default_legacy_queue(),
            inbound: default_inbound_queue(),
            group: default_queue_group(),
            consumer: default_queue_consumer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Base URL of the asset service. Unset disables picture cleanup.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_asset_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_asset_timeout_ms() -> u64 {
    5000
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_asset_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("medreg.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., MEDREG__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("MEDREG")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
