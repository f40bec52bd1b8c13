//! Integration tests for the record service.
//!
//! These run the full read and write paths over the in-memory backends:
//! scope-partitioned caching, blanket invalidation after writes, queue
//! routing, and the degradation rules for cache, queue and asset-store
//! failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use medreg_cache::{CacheError, MemoryCache, SnapshotCache};
use medreg_core::error::CoreError;
use medreg_core::event::{ChangeEvent, ChangeKind};
use medreg_core::model::{
    CallerIdentity, NewHospital, NewUser, NewWard, ResourceKind, Role, WardKind,
};
use medreg_core::scope::DEVELOPMENT_HOSPITAL_ID;
use medreg_notify::{
    DEVICE_QUEUE, DeliveryStream, InMemoryBroker, LEGACY_QUEUE, Notifier, NotifyError,
    QueueTransport,
};
use medreg_service::assets::{AssetError, AssetStore, NoopAssetStore};
use medreg_service::records::RecordService;
use medreg_store::{MemoryStore, RecordStore};

fn caller(role: Role, hospital_id: &str) -> CallerIdentity {
    CallerIdentity {
        id: "caller-1".to_string(),
        role,
        hospital_id: hospital_id.to_string(),
        ward_id: String::new(),
    }
}

fn new_hospital(id: &str, name: &str, sequence: i32) -> NewHospital {
    NewHospital {
        id: Some(id.to_string()),
        name: name.to_string(),
        sequence: Some(sequence),
        address: None,
        phone: None,
        contact_name: None,
        contact_phone: None,
        latitude: None,
        longitude: None,
        picture: None,
    }
}

fn new_ward(id: &str, name: &str, hospital_id: &str, sequence: i32, kind: WardKind) -> NewWard {
    NewWard {
        id: Some(id.to_string()),
        name: name.to_string(),
        sequence: Some(sequence),
        kind: Some(kind),
        hospital_id: hospital_id.to_string(),
    }
}

fn new_user(id: &str, username: &str, ward_id: &str, role: Role) -> NewUser {
    NewUser {
        id: Some(id.to_string()),
        ward_id: ward_id.to_string(),
        username: username.to_string(),
        password_hash: format!("hash-{username}"),
        active: Some(true),
        role: Some(role),
        display_name: None,
        picture: None,
        note: None,
        created_by: None,
    }
}

/// H-2 sorts before H-1 (sequence 1 vs 2); the development organization
/// sorts last. W-1 and W-2 both belong to H-1, with W-2 first.
async fn seed(store: &MemoryStore) {
    store
        .create_hospital(new_hospital("H-1", "General", 2))
        .await
        .unwrap();
    store
        .create_hospital(new_hospital("H-2", "Riverside", 1))
        .await
        .unwrap();
    store
        .create_hospital(new_hospital(DEVELOPMENT_HOSPITAL_ID, "Development", 99))
        .await
        .unwrap();

    store
        .create_ward(new_ward("W-1", "ICU", "H-1", 2, WardKind::Standard))
        .await
        .unwrap();
    store
        .create_ward(new_ward("W-2", "ER", "H-1", 1, WardKind::Standard))
        .await
        .unwrap();
    store
        .create_ward(new_ward("W-3", "Surgery", "H-2", 1, WardKind::Standard))
        .await
        .unwrap();
    store
        .create_ward(new_ward(
            "W-DEV",
            "Staging",
            DEVELOPMENT_HOSPITAL_ID,
            1,
            WardKind::Standard,
        ))
        .await
        .unwrap();

    store
        .create_user(new_user("U-1", "nurse1", "W-1", Role::User))
        .await
        .unwrap();
    store
        .create_user(new_user("U-2", "admin1", "W-2", Role::Admin))
        .await
        .unwrap();
}

struct Harness {
    service: RecordService,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    broker: Arc<InMemoryBroker>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let broker = Arc::new(InMemoryBroker::new());
        seed(&store).await;

        let service = RecordService::new(
            store.clone(),
            cache.clone(),
            Notifier::with_default_queues(broker.clone()),
            Arc::new(NoopAssetStore),
        );
        Self {
            service,
            store,
            cache,
            broker,
        }
    }

    async fn device_events(&self) -> Vec<ChangeEvent> {
        decode(self.broker.published(DEVICE_QUEUE).await)
    }

    async fn legacy_events(&self) -> Vec<ChangeEvent> {
        decode(self.broker.published(LEGACY_QUEUE).await)
    }
}

fn decode(payloads: Vec<Vec<u8>>) -> Vec<ChangeEvent> {
    payloads
        .iter()
        .map(|bytes| serde_json::from_slice(bytes).unwrap())
        .collect()
}

// ==================== Scoped list reads ====================

#[tokio::test]
async fn test_admin_list_is_scoped_and_cached() {
    let h = Harness::new().await;
    let admin = caller(Role::Admin, "H-1");

    let records = h.service.list_hospitals(&admin).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].hospital.id, "H-1");
    // Wards embedded in sequence order
    let ward_ids: Vec<&str> = records[0].wards.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ward_ids, ["W-2", "W-1"]);
    assert!(h.cache.contains("hospital:H-1"));

    // A write that bypasses the service is invisible until invalidation:
    // the snapshot is served as-is.
    h.store
        .create_hospital(new_hospital("H-9", "Backdoor", 5))
        .await
        .unwrap();
    let cached = h.service.list_hospitals(&admin).await.unwrap();
    assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn test_service_list_excludes_the_development_organization() {
    let h = Harness::new().await;
    let svc_caller = caller(Role::Service, "");

    let records = h.service.list_hospitals(&svc_caller).await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.hospital.id.as_str()).collect();
    assert_eq!(ids, ["H-2", "H-1"]);
    assert!(
        h.cache
            .contains(&format!("hospital:{DEVELOPMENT_HOSPITAL_ID}"))
    );
}

#[tokio::test]
async fn test_super_sees_everything_in_sequence_order() {
    let h = Harness::new().await;

    let records = h
        .service
        .list_hospitals(&caller(Role::Super, ""))
        .await
        .unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.hospital.id.as_str()).collect();
    assert_eq!(ids, ["H-2", "H-1", DEVELOPMENT_HOSPITAL_ID]);
    assert!(h.cache.contains("hospital"));
}

#[tokio::test]
async fn test_listing_requires_a_privileged_scope() {
    let h = Harness::new().await;

    let err = h
        .service
        .list_hospitals(&caller(Role::User, "H-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidScope { .. }));
    assert!(err.is_client_error());

    // An admin identity without a bound organization is rejected, not
    // silently widened.
    let err = h
        .service
        .list_wards(&caller(Role::Admin, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidScope { .. }));

    assert_eq!(h.cache.len(), 0);
}

#[tokio::test]
async fn test_empty_results_are_not_cached() {
    let h = Harness::new().await;
    let admin = caller(Role::Admin, "H-3");

    h.store
        .create_hospital(new_hospital("H-3", "Annex", 7))
        .await
        .unwrap();

    let wards = h.service.list_wards(&admin).await.unwrap();
    assert!(wards.is_empty());
    assert!(!h.cache.contains("ward:H-3"));

    // Once the first ward exists, the next read is a fresh store hit and
    // gets cached.
    h.store
        .create_ward(new_ward("W-7", "New Wing", "H-3", 1, WardKind::Standard))
        .await
        .unwrap();
    let wards = h.service.list_wards(&admin).await.unwrap();
    assert_eq!(wards.len(), 1);
    assert!(h.cache.contains("ward:H-3"));
}

// ==================== Record reads ====================

#[tokio::test]
async fn test_record_reads_are_cached_until_a_service_write() {
    let h = Harness::new().await;

    let record = h.service.get_hospital("H-1").await.unwrap();
    assert_eq!(record.hospital.name, "General");
    assert!(h.cache.contains("hospital:id:H-1"));

    // A store-direct rename is masked by the snapshot.
    h.store
        .update_hospital(
            "H-1",
            medreg_core::model::HospitalUpdate {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.service.get_hospital("H-1").await.unwrap().hospital.name,
        "General"
    );

    // A service write invalidates the whole hospital prefix.
    h.service
        .update_hospital(
            &caller(Role::Super, ""),
            "H-1",
            medreg_core::model::HospitalUpdate {
                name: Some("General West".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.service.get_hospital("H-1").await.unwrap().hospital.name,
        "General West"
    );
}

#[tokio::test]
async fn test_get_missing_record_is_not_found() {
    let h = Harness::new().await;
    let err = h.service.get_ward("W-404").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    assert_eq!(err.to_string(), "ward not found: W-404");
}

// ==================== Write invalidation ====================

#[tokio::test]
async fn test_writes_invalidate_every_scope_partition() {
    let h = Harness::new().await;
    let root = caller(Role::Super, "");
    let admin = caller(Role::Admin, "H-1");

    h.service.list_hospitals(&root).await.unwrap();
    h.service.list_hospitals(&admin).await.unwrap();
    assert!(h.cache.contains("hospital"));
    assert!(h.cache.contains("hospital:H-1"));

    h.service
        .create_hospital(&root, new_hospital("H-4", "Lakeside", 3))
        .await
        .unwrap();

    assert!(!h.cache.contains("hospital"));
    assert!(!h.cache.contains("hospital:H-1"));

    let ids: Vec<String> = h
        .service
        .list_hospitals(&root)
        .await
        .unwrap()
        .iter()
        .map(|r| r.hospital.id.clone())
        .collect();
    assert!(ids.contains(&"H-4".to_string()));
}

#[tokio::test]
async fn test_ward_writes_refresh_embedded_hospital_views() {
    let h = Harness::new().await;
    let admin = caller(Role::Admin, "H-1");

    let before = h.service.list_hospitals(&admin).await.unwrap();
    assert_eq!(before[0].wards.len(), 2);

    h.service
        .create_ward(
            &admin,
            new_ward("W-8", "Recovery", "H-1", 3, WardKind::Standard),
        )
        .await
        .unwrap();

    // The hospital snapshot embeds wards, so ward writes clear it too.
    let after = h.service.list_hospitals(&admin).await.unwrap();
    assert_eq!(after[0].wards.len(), 3);
}

#[tokio::test]
async fn test_user_writes_leave_hospital_snapshots_alone() {
    let h = Harness::new().await;
    let root = caller(Role::Super, "");

    h.service.list_hospitals(&root).await.unwrap();
    assert!(h.cache.contains("hospital"));

    h.service
        .create_user(&root, new_user("U-5", "nurse5", "W-1", Role::User))
        .await
        .unwrap();

    // Hospital views do not embed users.
    assert!(h.cache.contains("hospital"));
    assert!(!h.cache.contains("user"));
}

// ==================== Queue routing ====================

#[tokio::test]
async fn test_ward_announcements_route_by_kind() {
    let h = Harness::new().await;
    let root = caller(Role::Super, "");

    h.service
        .create_ward(
            &root,
            new_ward("W-S", "Day Ward", "H-2", 5, WardKind::Standard),
        )
        .await
        .unwrap();
    h.service
        .create_ward(
            &root,
            new_ward("W-L", "Cold Storage", "H-2", 6, WardKind::Legacy),
        )
        .await
        .unwrap();
    h.service
        .update_ward(
            &root,
            "W-L",
            medreg_core::model::WardUpdate {
                name: Some("Cold Storage B".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.service.delete_ward(&root, "W-L").await.unwrap();

    let device = h.device_events().await;
    assert_eq!(device.len(), 1);
    assert_eq!(device[0].id, "W-S");
    assert_eq!(device[0].kind, ChangeKind::Create);

    let legacy = h.legacy_events().await;
    let kinds: Vec<ChangeKind> = legacy.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete]
    );
    assert!(legacy.iter().all(|e| e.id == "W-L"));
    assert_eq!(legacy[1].payload["name"], "Cold Storage B");
}

#[tokio::test]
async fn test_hospital_and_user_announcements_use_the_device_queue() {
    let h = Harness::new().await;
    let root = caller(Role::Super, "");

    h.service
        .create_hospital(&root, new_hospital("H-5", "Hilltop", 4))
        .await
        .unwrap();
    h.service
        .create_user(&root, new_user("U-6", "nurse6", "W-3", Role::User))
        .await
        .unwrap();
    h.service.delete_user(&root, "U-6").await.unwrap();

    let device = h.device_events().await;
    assert_eq!(device.len(), 3);
    assert_eq!(device[0].resource, ResourceKind::Hospital);
    assert_eq!(device[0].payload["name"], "Hilltop");
    assert_eq!(device[1].resource, ResourceKind::User);
    assert_eq!(device[2].kind, ChangeKind::Delete);
    assert_eq!(device[2].payload["name"], "nurse6");

    assert!(h.legacy_events().await.is_empty());
}

// ==================== Mutation guard and conflicts ====================

#[tokio::test]
async fn test_users_may_not_mutate() {
    let h = Harness::new().await;
    let nurse = caller(Role::User, "H-1");

    let err = h
        .service
        .create_ward(
            &nurse,
            new_ward("W-X", "Rogue", "H-1", 9, WardKind::Standard),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidScope { .. }));
    assert!(h.device_events().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_username_reports_the_field() {
    let h = Harness::new().await;
    let root = caller(Role::Super, "");

    let err = h
        .service
        .create_user(&root, new_user("U-7", "nurse1", "W-2", Role::User))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Conflict: The value for field 'username' already exists"
    );

    // The failed write announces nothing.
    assert!(h.device_events().await.is_empty());
}

#[tokio::test]
async fn test_deleting_a_hospital_with_wards_is_a_conflict() {
    let h = Harness::new().await;
    let err = h
        .service
        .delete_hospital(&caller(Role::Super, ""), "H-1")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));
    assert!(h.service.get_hospital("H-1").await.is_ok());
}

// ==================== Degradation ====================

struct FailingCache;

#[async_trait]
impl SnapshotCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        Err(CacheError::connection("cache offline"))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::connection("cache offline"))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::connection("cache offline"))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<(), CacheError> {
        Err(CacheError::connection("cache offline"))
    }
}

struct FailingTransport;

#[async_trait]
impl QueueTransport for FailingTransport {
    async fn publish(&self, _queue: &str, _payload: Vec<u8>) -> Result<(), NotifyError> {
        Err(NotifyError::Publish("broker offline".to_string()))
    }

    async fn consume(&self, _queue: &str) -> Result<Box<dyn DeliveryStream>, NotifyError> {
        Err(NotifyError::Connection("broker offline".to_string()))
    }
}

struct FailingAssetStore;

#[async_trait]
impl AssetStore for FailingAssetStore {
    async fn release(&self, _bucket: &str, _reference: &str) -> Result<(), AssetError> {
        Err(AssetError::new("asset service offline"))
    }
}

#[tokio::test]
async fn test_cache_failures_degrade_to_the_store() {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    let service = RecordService::new(
        store,
        Arc::new(FailingCache),
        Notifier::with_default_queues(Arc::new(InMemoryBroker::new())),
        Arc::new(NoopAssetStore),
    );
    let root = caller(Role::Super, "");

    // Reads fall through to the store, writes still commit.
    assert_eq!(service.list_hospitals(&root).await.unwrap().len(), 3);
    assert_eq!(service.get_ward("W-1").await.unwrap().ward.name, "ICU");
    let created = service
        .create_hospital(&root, new_hospital("H-6", "Fallback", 8))
        .await
        .unwrap();
    assert_eq!(created.name, "Fallback");
}

#[tokio::test]
async fn test_publish_failures_do_not_fail_writes() {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    let service = RecordService::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Notifier::new(Arc::new(FailingTransport), DEVICE_QUEUE, LEGACY_QUEUE),
        Arc::new(NoopAssetStore),
    );

    let ward = service
        .create_ward(
            &caller(Role::Super, ""),
            new_ward("W-9", "Quiet Wing", "H-2", 2, WardKind::Legacy),
        )
        .await
        .unwrap();
    assert_eq!(ward.id, "W-9");
    assert!(store.get_ward("W-9").await.unwrap().is_some());
}

#[tokio::test]
async fn test_asset_release_failures_do_not_fail_deletes() {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    let mut pictured = new_user("U-8", "nurse8", "W-1", Role::User);
    pictured.picture = Some("https://assets.example/media/image/users/u8.png".to_string());
    store.create_user(pictured).await.unwrap();

    let service = RecordService::new(
        store.clone(),
        Arc::new(MemoryCache::new()),
        Notifier::with_default_queues(Arc::new(InMemoryBroker::new())),
        Arc::new(FailingAssetStore),
    );

    let removed = service
        .delete_user(&caller(Role::Super, ""), "U-8")
        .await
        .unwrap();
    assert_eq!(removed.username, "nurse8");
    assert!(store.get_user("U-8").await.unwrap().is_none());
}

// ==================== Asset release ====================

struct RecordingAssetStore {
    releases: tokio::sync::Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AssetStore for RecordingAssetStore {
    async fn release(&self, bucket: &str, reference: &str) -> Result<(), AssetError> {
        self.releases
            .lock()
            .await
            .push((bucket.to_string(), reference.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_deletes_release_pictures_once_committed() {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;
    let mut pictured = new_user("U-9", "nurse9", "W-3", Role::User);
    pictured.picture = Some("https://assets.example/media/image/users/u9.png".to_string());
    store.create_user(pictured).await.unwrap();

    let assets = Arc::new(RecordingAssetStore {
        releases: tokio::sync::Mutex::new(Vec::new()),
    });
    let service = RecordService::new(
        store,
        Arc::new(MemoryCache::new()),
        Notifier::with_default_queues(Arc::new(InMemoryBroker::new())),
        assets.clone(),
    );
    let root = caller(Role::Super, "");

    service.delete_user(&root, "U-9").await.unwrap();
    // U-1 has no picture, so its delete releases nothing.
    service.delete_user(&root, "U-1").await.unwrap();

    let releases = assets.releases.lock().await;
    assert_eq!(
        *releases,
        [(
            "users".to_string(),
            "https://assets.example/media/image/users/u9.png".to_string()
        )]
    );
}

// ==================== Credentials ====================

#[tokio::test]
async fn test_credentials_always_read_fresh() {
    let h = Harness::new().await;

    let creds = h.service.user_credentials("nurse1").await.unwrap().unwrap();
    assert_eq!(creds.password_hash, "hash-nurse1");
    assert_eq!(creds.hospital_id, "H-1");

    // A store-direct credential rotation is visible immediately: no cache
    // sits in front of this lookup.
    h.store
        .update_user(
            "U-1",
            medreg_core::model::UserUpdate {
                password_hash: Some("hash-rotated".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let creds = h.service.user_credentials("nurse1").await.unwrap().unwrap();
    assert_eq!(creds.password_hash, "hash-rotated");

    assert!(h.service.user_credentials("ghost").await.unwrap().is_none());
}
