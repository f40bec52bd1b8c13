//! The snapshot cache abstraction.
//!
//! Read results are cached as serialized JSON snapshots under role- or
//! record-derived keys. Backends must be thread-safe (`Send + Sync`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Byte-payload cache with per-entry TTL and prefix invalidation.
///
/// Every method reports failures instead of hiding them; the call site owns
/// the degradation policy (a failed `get` is a miss, a failed `set` or
/// `delete_prefix` is logged and the request continues).
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Fetch a snapshot. `None` for absent or expired entries.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend trouble, never for a plain miss.
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Store a snapshot under `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend rejected or never received the
    /// write; the entry state is then unknown.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Drop a single entry. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every entry whose key starts with `prefix`.
    ///
    /// This is the blanket invalidation used after writes: one prefix per
    /// resource family clears all role partitions and record snapshots.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_are_object_safe() {
        fn _assert_snapshot_cache_object_safe(_: &dyn SnapshotCache) {}
    }
}
