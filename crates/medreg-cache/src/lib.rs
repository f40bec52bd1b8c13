//! Snapshot caching for the medreg registry.
//!
//! List reads are cached per role partition and single-record reads per
//! record id; writes blanket-invalidate whole key prefixes. This crate
//! provides the cache seam plus the two backends: in-process DashMap for
//! single-instance use and Redis for shared deployments.

pub mod error;
pub mod memory;
pub mod redis;
pub mod traits;

pub use error::CacheError;
pub use memory::{CachedEntry, MemoryCache};
pub use redis::RedisCache;
pub use traits::SnapshotCache;
