//! Redis cache backend for shared deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::traits::SnapshotCache;

/// Snapshot cache on a pooled Redis connection.
///
/// Prefix invalidation walks the keyspace with cursor-based `SCAN` and
/// deletes in batches; `KEYS` would block the server on large keyspaces.
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))
    }
}

#[async_trait]
impl SnapshotCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        let mut conn = self.connection().await?;
        let data = conn
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| CacheError::operation(format!("GET {key}: {e}")))?;
        Ok(data.map(Arc::new))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value.as_slice(), ttl_secs)
            .await
            .map_err(|e| CacheError::operation(format!("SET {key}: {e}")))?;
        tracing::debug!(key = %key, ttl_secs = %ttl_secs, "cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::operation(format!("DEL {key}: {e}")))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed: usize = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::operation(format!("SCAN {pattern}: {e}")))?;

            if !keys.is_empty() {
                removed += keys.len();
                conn.del::<_, ()>(keys)
                    .await
                    .map_err(|e| CacheError::operation(format!("DEL {pattern}: {e}")))?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::debug!(prefix = %prefix, removed = %removed, "cache prefix invalidated");
        Ok(())
    }
}
