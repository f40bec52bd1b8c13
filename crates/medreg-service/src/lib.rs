//! Registry service wiring.
//!
//! Pulls the registry crates together behind [`RecordService`]: the record
//! store (memory or Postgres), the snapshot cache, the outbound queues and
//! the asset client, all selected from [`AppConfig`]. The binary in
//! `main.rs` adds the inbound consumer loop on top.

pub mod assets;
pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod records;

pub use assets::{
    AssetError, AssetStore, HOSPITAL_BUCKET, HttpAssetStore, NoopAssetStore, USER_BUCKET,
};
pub use bootstrap::{
    AppState, Backends, build_service, create_asset_store, create_backends, create_record_store,
};
pub use self::config::{
    AppConfig, AssetConfig, CacheSettings, LoggingConfig, QueueConfig, RedisConfig, StoreBackend,
    StoreConfig,
};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use records::{DEFAULT_LIST_TTL, DEFAULT_RECORD_TTL, RecordService};
