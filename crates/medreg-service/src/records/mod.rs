//! The record service.
//!
//! Reads resolve the caller's scope, try the cache partition that scope
//! maps to, and fall back to the store, filling the cache on the way out.
//! Writes commit to the store first, then invalidate every cache entry
//! under the resource prefix, then announce the change downstream. A crash
//! between those steps leaves at worst a stale snapshot that expires with
//! its TTL, never a phantom record.
//!
//! Cache, queue and asset-store failures are absorbed here: they are
//! logged and the request continues against the store. Only store failures
//! and scope violations reach the caller.

mod hospitals;
mod inbound;
mod users;
mod wards;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use medreg_cache::SnapshotCache;
use medreg_core::error::CoreError;
use medreg_core::event::ChangeEvent;
use medreg_core::model::{CallerIdentity, ResourceKind, WardKind};
use medreg_core::scope::{MUTATING_ROLES, authorize};
use medreg_notify::Notifier;
use medreg_store::{RecordStore, StoreError};

use crate::assets::AssetStore;

/// Default lifetime of list snapshots (ten hours).
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(36_000);

/// Default lifetime of single-record snapshots (one day).
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(86_400);

/// Translate store failures into the service error vocabulary.
fn store_to_core(err: StoreError) -> CoreError {
    match err {
        StoreError::NotFound { resource, id } => CoreError::not_found(resource, id),
        StoreError::AlreadyExists { resource, id } => {
            CoreError::conflict(format!("{resource} {id} already exists"))
        }
        StoreError::UniqueViolation { field } => CoreError::duplicate_field(field),
        StoreError::ForeignKey { message } => CoreError::conflict(message),
        StoreError::Connection { message } | StoreError::Internal { message } => {
            CoreError::storage(message)
        }
    }
}

/// Role-scoped hospital / ward / user operations over a store, a snapshot
/// cache and the downstream queues.
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn SnapshotCache>,
    notifier: Notifier,
    assets: Arc<dyn AssetStore>,
    list_ttl: Duration,
    record_ttl: Duration,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn SnapshotCache>,
        notifier: Notifier,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            assets,
            list_ttl: DEFAULT_LIST_TTL,
            record_ttl: DEFAULT_RECORD_TTL,
        }
    }

    /// Override the snapshot lifetimes.
    #[must_use]
    pub fn with_ttls(mut self, list_ttl: Duration, record_ttl: Duration) -> Self {
        self.list_ttl = list_ttl;
        self.record_ttl = record_ttl;
        self
    }

    /// Every mutation goes through this gate; reads have their own scope
    /// resolution in [`medreg_core::scope::list_scope`].
    fn require_writer(&self, caller: &CallerIdentity) -> Result<(), CoreError> {
        if authorize(caller.role, MUTATING_ROLES) {
            Ok(())
        } else {
            Err(CoreError::invalid_scope(format!(
                "role {} may not modify registry records",
                caller.role
            )))
        }
    }

    /// A backend failure or an undecodable entry is treated as a miss.
    async fn cache_lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling back to store");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = self.cache.delete(key).await {
                    warn!(key = %key, error = %e, "Cache delete failed");
                }
                None
            }
        }
    }

    async fn cache_store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Blanket prefix invalidation after a committed write. One prefix per
    /// resource family clears every scope partition and record snapshot at
    /// once. Ward writes also clear hospital entries, which embed wards.
    async fn invalidate(&self, resource: ResourceKind) {
        let prefixes: &[&str] = match resource {
            ResourceKind::Hospital => &["hospital"],
            ResourceKind::Ward => &["ward", "hospital"],
            ResourceKind::User => &["user"],
        };
        for prefix in prefixes {
            if let Err(e) = self.cache.delete_prefix(prefix).await {
                warn!(prefix = %prefix, error = %e, "Cache invalidation failed");
            }
        }
    }

    /// Best-effort announcement to the device queue. The write has already
    /// committed, so failures are logged and swallowed.
    async fn announce(&self, event: ChangeEvent) {
        if let Err(e) = self.notifier.publish_change(&event).await {
            warn!(
                kind = %event.kind,
                resource = %event.resource,
                id = %event.id,
                error = %e,
                "Change announcement failed"
            );
        }
    }

    /// Best-effort ward announcement, routed by the ward's kind.
    async fn announce_ward(&self, event: ChangeEvent, kind: WardKind) {
        if let Err(e) = self.notifier.publish_ward_change(&event, kind).await {
            warn!(
                kind = %event.kind,
                resource = %event.resource,
                id = %event.id,
                ward_kind = %kind,
                error = %e,
                "Change announcement failed"
            );
        }
    }

    /// Best-effort release of a stored picture after its record was
    /// deleted.
    async fn release_picture(&self, bucket: &str, picture: Option<&str>) {
        let Some(reference) = picture else {
            return;
        };
        if let Err(e) = self.assets.release(bucket, reference).await {
            warn!(bucket = %bucket, error = %e, "Asset release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medreg_core::error::ErrorCategory;

    #[test]
    fn test_store_errors_map_to_service_errors() {
        let err = store_to_core(StoreError::not_found("hospital", "H-9"));
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(err.to_string(), "hospital not found: H-9");

        let err = store_to_core(StoreError::already_exists("ward", "W-1"));
        assert_eq!(err.to_string(), "Conflict: ward W-1 already exists");

        let err = store_to_core(StoreError::unique_violation("username"));
        assert_eq!(
            err.to_string(),
            "Conflict: The value for field 'username' already exists"
        );

        let err = store_to_core(StoreError::foreign_key("ward W-1 still has users"));
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_infrastructure_failures_surface_as_storage() {
        let err = store_to_core(StoreError::connection("connection refused"));
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "Storage failure: connection refused");

        let err = store_to_core(StoreError::internal("row decode failed"));
        assert!(err.is_server_error());
    }
}
