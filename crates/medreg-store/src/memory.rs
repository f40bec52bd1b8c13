//! In-memory record store.
//!
//! Backs tests and single-instance development deployments. One `RwLock`
//! guards all three maps so relation checks and the mutation they protect
//! happen under the same critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use medreg_core::id::generate_id;
use medreg_core::model::{
    Hospital, HospitalRecord, HospitalUpdate, NewHospital, NewUser, NewWard, Role, User,
    UserCredentials, UserRecord, UserUpdate, Ward, WardRecord, WardUpdate,
};
use medreg_core::scope::ScopeFilter;

use crate::error::StoreError;
use crate::traits::RecordStore;

#[derive(Debug, Default)]
struct Inner {
    hospitals: HashMap<String, Hospital>,
    wards: HashMap<String, Ward>,
    users: HashMap<String, User>,
}

impl Inner {
    fn wards_of(&self, hospital_id: &str) -> Vec<Ward> {
        let mut wards: Vec<Ward> = self
            .wards
            .values()
            .filter(|w| w.hospital_id == hospital_id)
            .cloned()
            .collect();
        wards.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
        wards
    }
}

/// HashMap-backed implementation of [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_hospital(&self, new: NewHospital) -> Result<Hospital, StoreError> {
        let now = OffsetDateTime::now_utc();
        let hospital = Hospital {
            id: new.id.unwrap_or_else(generate_id),
            name: new.name,
            sequence: new.sequence.unwrap_or(0),
            address: new.address,
            phone: new.phone,
            contact_name: new.contact_name,
            contact_phone: new.contact_phone,
            latitude: new.latitude,
            longitude: new.longitude,
            picture: new.picture,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        if inner.hospitals.contains_key(&hospital.id) {
            return Err(StoreError::already_exists("hospital", &hospital.id));
        }
        inner
            .hospitals
            .insert(hospital.id.clone(), hospital.clone());
        Ok(hospital)
    }

    async fn list_hospitals(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<HospitalRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut hospitals: Vec<&Hospital> = inner
            .hospitals
            .values()
            .filter(|h| filter.allows(&h.id))
            .collect();
        hospitals.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));

        Ok(hospitals
            .into_iter()
            .map(|h| HospitalRecord {
                hospital: h.clone(),
                wards: inner.wards_of(&h.id),
            })
            .collect())
    }

    async fn get_hospital(&self, id: &str) -> Result<Option<HospitalRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.hospitals.get(id).map(|h| HospitalRecord {
            hospital: h.clone(),
            wards: inner.wards_of(id),
        }))
    }

    async fn update_hospital(
        &self,
        id: &str,
        patch: HospitalUpdate,
    ) -> Result<Hospital, StoreError> {
        let mut inner = self.inner.write().await;
        let hospital = inner
            .hospitals
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("hospital", id))?;

        if let Some(name) = patch.name {
            hospital.name = name;
        }
        if let Some(sequence) = patch.sequence {
            hospital.sequence = sequence;
        }
        if let Some(address) = patch.address {
            hospital.address = Some(address);
        }
        if let Some(phone) = patch.phone {
            hospital.phone = Some(phone);
        }
        if let Some(contact_name) = patch.contact_name {
            hospital.contact_name = Some(contact_name);
        }
        if let Some(contact_phone) = patch.contact_phone {
            hospital.contact_phone = Some(contact_phone);
        }
        if let Some(latitude) = patch.latitude {
            hospital.latitude = Some(latitude);
        }
        if let Some(longitude) = patch.longitude {
            hospital.longitude = Some(longitude);
        }
        if let Some(picture) = patch.picture {
            hospital.picture = Some(picture);
        }
        hospital.updated_at = OffsetDateTime::now_utc();
        Ok(hospital.clone())
    }

    async fn delete_hospital(&self, id: &str) -> Result<Hospital, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.wards.values().any(|w| w.hospital_id == id) {
            return Err(StoreError::foreign_key(format!(
                "hospital {id} still has wards"
            )));
        }
        inner
            .hospitals
            .remove(id)
            .ok_or_else(|| StoreError::not_found("hospital", id))
    }

    async fn create_ward(&self, new: NewWard) -> Result<Ward, StoreError> {
        let now = OffsetDateTime::now_utc();
        let ward = Ward {
            id: new.id.unwrap_or_else(generate_id),
            name: new.name,
            sequence: new.sequence.unwrap_or(0),
            kind: new.kind.unwrap_or_default(),
            hospital_id: new.hospital_id,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        if !inner.hospitals.contains_key(&ward.hospital_id) {
            return Err(StoreError::foreign_key(format!(
                "ward references missing hospital {}",
                ward.hospital_id
            )));
        }
        if inner.wards.contains_key(&ward.id) {
            return Err(StoreError::already_exists("ward", &ward.id));
        }
        inner.wards.insert(ward.id.clone(), ward.clone());
        Ok(ward)
    }

    async fn list_wards(&self, filter: &ScopeFilter) -> Result<Vec<WardRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut wards: Vec<&Ward> = inner
            .wards
            .values()
            .filter(|w| filter.allows(&w.hospital_id))
            .collect();
        wards.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));

        Ok(wards
            .into_iter()
            .filter_map(|w| {
                inner.hospitals.get(&w.hospital_id).map(|h| WardRecord {
                    ward: w.clone(),
                    hospital: h.clone(),
                })
            })
            .collect())
    }

    async fn get_ward(&self, id: &str) -> Result<Option<WardRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.wards.get(id).and_then(|w| {
            inner.hospitals.get(&w.hospital_id).map(|h| WardRecord {
                ward: w.clone(),
                hospital: h.clone(),
            })
        }))
    }

    async fn update_ward(&self, id: &str, patch: WardUpdate) -> Result<Ward, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(ref hospital_id) = patch.hospital_id {
            if !inner.hospitals.contains_key(hospital_id) {
                return Err(StoreError::foreign_key(format!(
                    "ward references missing hospital {hospital_id}"
                )));
            }
        }

        let ward = inner
            .wards
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("ward", id))?;
        if let Some(name) = patch.name {
            ward.name = name;
        }
        if let Some(sequence) = patch.sequence {
            ward.sequence = sequence;
        }
        if let Some(kind) = patch.kind {
            ward.kind = kind;
        }
        if let Some(hospital_id) = patch.hospital_id {
            ward.hospital_id = hospital_id;
        }
        ward.updated_at = OffsetDateTime::now_utc();
        Ok(ward.clone())
    }

    async fn delete_ward(&self, id: &str) -> Result<Ward, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.ward_id == id) {
            return Err(StoreError::foreign_key(format!(
                "ward {id} still has users"
            )));
        }
        inner
            .wards
            .remove(id)
            .ok_or_else(|| StoreError::not_found("ward", id))
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: new.id.unwrap_or_else(generate_id),
            username: new.username,
            password_hash: new.password_hash,
            active: new.active.unwrap_or(true),
            role: new.role.unwrap_or(Role::User),
            display_name: new.display_name,
            picture: new.picture,
            note: new.note,
            created_by: new.created_by,
            ward_id: new.ward_id,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        if !inner.wards.contains_key(&user.ward_id) {
            return Err(StoreError::foreign_key(format!(
                "user references missing ward {}",
                user.ward_id
            )));
        }
        if inner.users.contains_key(&user.id) {
            return Err(StoreError::already_exists("user", &user.id));
        }
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::unique_violation("username"));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn list_users(&self, filter: &ScopeFilter) -> Result<Vec<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut users: Vec<&User> = inner.users.values().collect();
        users.sort_by(|a, b| {
            a.role
                .rank()
                .cmp(&b.role.rank())
                .then_with(|| a.username.cmp(&b.username))
        });

        let mut records = Vec::new();
        for user in users {
            let Some(ward) = inner.wards.get(&user.ward_id) else {
                continue;
            };
            let Some(hospital) = inner.hospitals.get(&ward.hospital_id) else {
                continue;
            };
            if !filter.allows(&hospital.id) {
                continue;
            }
            records.push(UserRecord::assemble(
                user.clone(),
                ward.clone(),
                hospital.clone(),
            ));
        }
        Ok(records)
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        let Some(user) = inner.users.get(id) else {
            return Ok(None);
        };
        let Some(ward) = inner.wards.get(&user.ward_id) else {
            return Ok(None);
        };
        let Some(hospital) = inner.hospitals.get(&ward.hospital_id) else {
            return Ok(None);
        };
        Ok(Some(UserRecord::assemble(
            user.clone(),
            ward.clone(),
            hospital.clone(),
        )))
    }

    async fn update_user(&self, id: &str, patch: UserUpdate) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(ref ward_id) = patch.ward_id {
            if !inner.wards.contains_key(ward_id) {
                return Err(StoreError::foreign_key(format!(
                    "user references missing ward {ward_id}"
                )));
            }
        }
        if let Some(ref username) = patch.username {
            if inner
                .users
                .values()
                .any(|u| u.id != id && &u.username == username)
            {
                return Err(StoreError::unique_violation("username"));
            }
        }

        let user = inner
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        if let Some(ward_id) = patch.ward_id {
            user.ward_id = ward_id;
        }
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(active) = patch.active {
            user.active = active;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(display_name) = patch.display_name {
            user.display_name = Some(display_name);
        }
        if let Some(picture) = patch.picture {
            user.picture = Some(picture);
        }
        if let Some(note) = patch.note {
            user.note = Some(note);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .users
            .remove(id)
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn user_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let inner = self.inner.read().await;
        let Some(user) = inner.users.values().find(|u| u.username == username) else {
            return Ok(None);
        };
        let Some(ward) = inner.wards.get(&user.ward_id) else {
            return Ok(None);
        };
        Ok(Some(UserCredentials {
            id: user.id.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            active: user.active,
            role: user.role,
            ward_id: user.ward_id.clone(),
            hospital_id: ward.hospital_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medreg_core::model::WardKind;
    use medreg_core::scope::DEVELOPMENT_HOSPITAL_ID;
    use std::sync::Arc;
    use tokio::task::JoinSet;

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

    fn new_ward(id: &str, name: &str, hospital_id: &str, sequence: i32) -> NewWard {
        NewWard {
            id: Some(id.to_string()),
            name: name.to_string(),
            sequence: Some(sequence),
            kind: None,
            hospital_id: hospital_id.to_string(),
        }
    }

    fn new_user(id: &str, username: &str, ward_id: &str, role: Role) -> NewUser {
        NewUser {
            id: Some(id.to_string()),
            ward_id: ward_id.to_string(),
            username: username.to_string(),
            password_hash: format!("hash-{username}"),
            active: None,
            role: Some(role),
            display_name: None,
            picture: None,
            note: None,
            created_by: None,
        }
    }

    /// Two regular hospitals plus the development org, with wards and users.
    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_hospital(new_hospital("H-1", "General", 2))
            .await
            .unwrap();
        store
            .create_hospital(new_hospital("H-2", "Riverside", 1))
            .await
            .unwrap();
        store
            .create_hospital(new_hospital(DEVELOPMENT_HOSPITAL_ID, "Dev Sandbox", 99))
            .await
            .unwrap();

        store
            .create_ward(new_ward("W-1", "ICU", "H-1", 2))
            .await
            .unwrap();
        store
            .create_ward(new_ward("W-2", "ER", "H-1", 1))
            .await
            .unwrap();
        store
            .create_ward(new_ward("W-3", "Surgery", "H-2", 1))
            .await
            .unwrap();
        store
            .create_ward(new_ward("W-DEV", "Test Ward", DEVELOPMENT_HOSPITAL_ID, 1))
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
        store
            .create_user(new_user("U-3", "nurse2", "W-3", Role::User))
            .await
            .unwrap();
        store
            .create_user(new_user("U-DEV", "devuser", "W-DEV", Role::Super))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_hospitals_are_ordered_by_sequence_with_wards_embedded() {
        let store = seeded().await;
        let records = store.list_hospitals(&ScopeFilter::All).await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.hospital.id.as_str()).collect();
        assert_eq!(ids, vec!["H-2", "H-1", DEVELOPMENT_HOSPITAL_ID]);

        let h1 = &records[1];
        let ward_ids: Vec<&str> = h1.wards.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ward_ids, vec!["W-2", "W-1"]);
    }

    #[tokio::test]
    async fn test_organization_filter_hides_other_orgs_and_development() {
        let store = seeded().await;

        let filter = ScopeFilter::Organization("H-1".to_string());
        let records = store.list_hospitals(&filter).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hospital.id, "H-1");

        let records = store.list_hospitals(&ScopeFilter::ExcludeDevelopment).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.hospital.id.as_str()).collect();
        assert_eq!(ids, vec!["H-2", "H-1"]);
    }

    #[tokio::test]
    async fn test_ward_listing_embeds_the_owning_hospital() {
        let store = seeded().await;
        let records = store
            .list_wards(&ScopeFilter::Organization("H-2".to_string()))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ward.id, "W-3");
        assert_eq!(records[0].hospital.name, "Riverside");
    }

    #[tokio::test]
    async fn test_users_are_ordered_by_role_rank_and_scoped_via_their_ward() {
        let store = seeded().await;

        let all = store.list_users(&ScopeFilter::All).await.unwrap();
        let usernames: Vec<&str> = all.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(usernames, vec!["devuser", "admin1", "nurse1", "nurse2"]);

        let h1_only = store
            .list_users(&ScopeFilter::Organization("H-1".to_string()))
            .await
            .unwrap();
        let usernames: Vec<&str> = h1_only.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(usernames, vec!["admin1", "nurse1"]);
        assert_eq!(h1_only[0].ward.hospital.id, "H-1");

        let visible = store.list_users(&ScopeFilter::ExcludeDevelopment).await.unwrap();
        assert!(visible.iter().all(|u| u.username != "devuser"));
    }

    #[tokio::test]
    async fn test_create_ward_requires_an_existing_hospital() {
        let store = MemoryStore::new();
        let err = store
            .create_ward(new_ward("W-9", "Orphan", "H-missing", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_usernames() {
        let store = seeded().await;
        let err = store
            .create_user(new_user("U-9", "nurse1", "W-1", Role::User))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref field } if field == "username"));
    }

    #[tokio::test]
    async fn test_update_user_rejects_taken_username_but_allows_own() {
        let store = seeded().await;

        let err = store
            .update_user(
                "U-1",
                UserUpdate {
                    username: Some("admin1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        // Re-asserting the current username is not a conflict.
        let user = store
            .update_user(
                "U-1",
                UserUpdate {
                    username: Some("nurse1".to_string()),
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!user.active);
    }

    #[tokio::test]
    async fn test_delete_hospital_with_wards_is_a_relation_conflict() {
        let store = seeded().await;
        let err = store.delete_hospital("H-1").await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));

        // Still present afterwards.
        assert!(store.get_hospital("H-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_ward_with_users_is_a_relation_conflict() {
        let store = seeded().await;
        let err = store.delete_ward("W-1").await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));

        store.delete_user("U-1").await.unwrap();
        let ward = store.delete_ward("W-1").await.unwrap();
        assert_eq!(ward.name, "ICU");
    }

    #[tokio::test]
    async fn test_delete_returns_the_removed_record() {
        let store = seeded().await;
        let user = store.delete_user("U-3").await.unwrap();
        assert_eq!(user.username, "nurse2");
        assert!(store.get_user("U-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_records_report_not_found() {
        let store = MemoryStore::new();
        assert!(store.get_hospital("nope").await.unwrap().is_none());
        assert!(
            store
                .update_ward("nope", WardUpdate::default())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(store.delete_user("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_patches_only_supplied_fields() {
        let store = seeded().await;
        let before = store.get_hospital("H-1").await.unwrap().unwrap().hospital;

        let after = store
            .update_hospital(
                "H-1",
                HospitalUpdate {
                    address: Some("12 Hill Road".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(after.name, before.name);
        assert_eq!(after.sequence, before.sequence);
        assert_eq!(after.address.as_deref(), Some("12 Hill Road"));
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_ward_kind_defaults_to_standard_and_can_be_updated() {
        let store = seeded().await;
        let record = store.get_ward("W-1").await.unwrap().unwrap();
        assert_eq!(record.ward.kind, WardKind::Standard);

        let ward = store
            .update_ward(
                "W-1",
                WardUpdate {
                    kind: Some(WardKind::Legacy),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ward.kind, WardKind::Legacy);
    }

    #[tokio::test]
    async fn test_generated_ids_when_payload_has_none() {
        let store = MemoryStore::new();
        let hospital = store
            .create_hospital(NewHospital {
                id: None,
                name: "Unnamed".to_string(),
                sequence: None,
                address: None,
                phone: None,
                contact_name: None,
                contact_phone: None,
                latitude: None,
                longitude: None,
                picture: None,
            })
            .await
            .unwrap();
        assert_eq!(hospital.id.len(), 36);
        assert_eq!(hospital.sequence, 0);
    }

    #[tokio::test]
    async fn test_credentials_lookup_carries_the_owning_hospital() {
        let store = seeded().await;
        let creds = store.user_credentials("admin1").await.unwrap().unwrap();
        assert_eq!(creds.id, "U-2");
        assert_eq!(creds.role, Role::Admin);
        assert_eq!(creds.ward_id, "W-2");
        assert_eq!(creds.hospital_id, "H-1");
        assert_eq!(creds.password_hash, "hash-admin1");

        assert!(store.user_credentials("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creates_with_distinct_ids_all_land() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = JoinSet::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .create_hospital(new_hospital(&format!("H-{i}"), "Parallel", i))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(
            store.list_hospitals(&ScopeFilter::All).await.unwrap().len(),
            16
        );
    }

    #[tokio::test]
    async fn test_concurrent_username_race_admits_exactly_one() {
        let store = Arc::new(seeded().await);
        let mut tasks = JoinSet::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .create_user(new_user(&format!("U-race-{i}"), "contender", "W-1", Role::User))
                    .await
            });
        }

        let mut won = 0;
        let mut lost = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => won += 1,
                Err(StoreError::UniqueViolation { .. }) => lost += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(lost, 7);
    }
}
