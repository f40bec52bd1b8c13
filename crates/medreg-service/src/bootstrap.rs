//! Backend selection and service assembly.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use medreg_cache::{MemoryCache, RedisCache, SnapshotCache};
use medreg_notify::{InMemoryBroker, Notifier, QueueTransport, RedisStreamTransport};
use medreg_store::{MemoryStore, RecordStore, StoreError};

use crate::assets::{AssetStore, HttpAssetStore, NoopAssetStore};
use crate::config::{AppConfig, AssetConfig, QueueConfig, RedisConfig, StoreBackend, StoreConfig};
use crate::records::RecordService;

/// Cache and queue backends. They are chosen together: one Redis decision
/// covers both, so a degraded instance is degraded consistently.
pub struct Backends {
    pub cache: Arc<dyn SnapshotCache>,
    pub transport: Arc<dyn QueueTransport>,
}

impl Backends {
    fn in_process() -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            transport: Arc::new(InMemoryBroker::new()),
        }
    }
}

/// Create the cache and queue backends based on configuration.
///
/// ## Graceful degradation
///
/// If the Redis connection fails, the instance falls back to in-process
/// backends. It keeps serving, but snapshots and queues are no longer
/// shared with other instances.
pub async fn create_backends(redis: &RedisConfig, queues: &QueueConfig) -> Backends {
    if !redis.enabled {
        info!("Redis disabled, using in-process cache and queues");
        return Backends::in_process();
    }

    info!(url = %redis.url, "Connecting to Redis");

    // Create Redis pool configuration
    let mut redis_config = deadpool_redis::Config::from_url(&redis.url);
    let mut pool_config = redis_config.pool.take().unwrap_or_default();
    pool_config.max_size = redis.pool_size;
    pool_config.timeouts.wait = Some(Duration::from_millis(redis.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(redis.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(redis.timeout_ms));
    redis_config.pool = Some(pool_config);

    // Create pool
    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process backends."
            );
            return Backends::in_process();
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            info!("✓ Connected to Redis successfully");
            Backends {
                cache: Arc::new(RedisCache::new(pool.clone())),
                transport: Arc::new(RedisStreamTransport::new(
                    pool,
                    redis.url.clone(),
                    queues.group.clone(),
                    queues.consumer.clone(),
                )),
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process backends."
            );
            Backends::in_process()
        }
    }
}

/// Create the record store named by the configuration.
///
/// # Errors
///
/// Fails when the Postgres backend is selected but unreachable. There is
/// no fallback here: records are the source of truth.
pub async fn create_record_store(
    config: &StoreConfig,
) -> Result<Arc<dyn RecordStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL record store");
            let store: Arc<dyn RecordStore> =
                medreg_store_postgres::create_store(&config.postgres).await?;
            Ok(store)
        }
    }
}

/// Create the asset store. Without a configured endpoint, picture cleanup
/// is disabled.
pub fn create_asset_store(config: &AssetConfig) -> Arc<dyn AssetStore> {
    match config.base_url.as_deref() {
        Some(base_url) if !base_url.is_empty() => Arc::new(HttpAssetStore::new(
            base_url,
            Duration::from_millis(config.timeout_ms),
        )),
        _ => {
            info!("Asset endpoint not configured, picture cleanup disabled");
            Arc::new(NoopAssetStore)
        }
    }
}

/// Everything `main` needs to run the service.
pub struct AppState {
    pub service: Arc<RecordService>,
    pub transport: Arc<dyn QueueTransport>,
}

/// Assemble the record service from configuration.
///
/// # Errors
///
/// Fails only when the configured record store cannot be created; cache
/// and queue backends degrade instead of failing.
pub async fn build_service(config: &AppConfig) -> Result<AppState, StoreError> {
    let store = create_record_store(&config.store).await?;
    let backends = create_backends(&config.redis, &config.queues).await;
    let notifier = Notifier::new(
        backends.transport.clone(),
        config.queues.device.clone(),
        config.queues.legacy.clone(),
    );
    let assets = create_asset_store(&config.assets);

    let service = RecordService::new(store, backends.cache, notifier, assets)
        .with_ttls(config.list_ttl(), config.record_ttl());

    Ok(AppState {
        service: Arc::new(service),
        transport: backends.transport,
    })
}
