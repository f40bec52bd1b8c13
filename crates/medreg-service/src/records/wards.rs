//! Ward operations.
//!
//! Ward announcements are routed by the ward's kind: LEGACY wards go to
//! the legacy bridge queue, everything else to the device queue. Ward
//! writes also invalidate hospital snapshots, which embed ward lists.

use medreg_core::error::CoreError;
use medreg_core::event::ChangeEvent;
use medreg_core::model::{CallerIdentity, NewWard, ResourceKind, Ward, WardRecord, WardUpdate};
use medreg_core::scope::{list_scope, record_cache_key};
use medreg_store::RecordStore;

use super::{RecordService, store_to_core};

impl RecordService {
    /// List the wards visible to `caller`, owning hospital embedded.
    pub async fn list_wards(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<WardRecord>, CoreError> {
        let scope = list_scope(ResourceKind::Ward, caller)?;
        if let Some(records) = self
            .cache_lookup::<Vec<WardRecord>>(&scope.cache_key)
            .await
        {
            return Ok(records);
        }

        let records = self
            .store
            .list_wards(&scope.filter)
            .await
            .map_err(store_to_core)?;

        if !records.is_empty() {
            self.cache_store(&scope.cache_key, &records, self.list_ttl)
                .await;
        }
        Ok(records)
    }

    /// Read one ward with its hospital.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown.
    pub async fn get_ward(&self, id: &str) -> Result<WardRecord, CoreError> {
        let key = record_cache_key(ResourceKind::Ward, id);
        if let Some(record) = self.cache_lookup::<WardRecord>(&key).await {
            return Ok(record);
        }

        let record = self
            .store
            .get_ward(id)
            .await
            .map_err(store_to_core)?
            .ok_or_else(|| CoreError::not_found("ward", id))?;

        self.cache_store(&key, &record, self.record_ttl).await;
        Ok(record)
    }

    /// Create a ward under an existing hospital.
    ///
    /// # Errors
    ///
    /// `Conflict` if the named hospital does not exist.
    pub async fn create_ward(
        &self,
        caller: &CallerIdentity,
        new: NewWard,
    ) -> Result<Ward, CoreError> {
        self.require_writer(caller)?;
        let ward = self.store.create_ward(new).await.map_err(store_to_core)?;

        self.invalidate(ResourceKind::Ward).await;
        self.announce_ward(
            ChangeEvent::created(ResourceKind::Ward, &ward.id, &ward.name),
            ward.kind,
        )
        .await;
        Ok(ward)
    }

    /// Apply a partial update and return the new state. The announcement
    /// is routed by the kind the ward has after the update.
    pub async fn update_ward(
        &self,
        caller: &CallerIdentity,
        id: &str,
        patch: WardUpdate,
    ) -> Result<Ward, CoreError> {
        self.require_writer(caller)?;
        let ward = self
            .store
            .update_ward(id, patch)
            .await
            .map_err(store_to_core)?;

        self.invalidate(ResourceKind::Ward).await;
        self.announce_ward(
            ChangeEvent::updated(ResourceKind::Ward, &ward.id, &ward.name),
            ward.kind,
        )
        .await;
        Ok(ward)
    }

    /// Delete a ward and return the removed record.
    ///
    /// # Errors
    ///
    /// `Conflict` while users still reference the ward.
    pub async fn delete_ward(
        &self,
        caller: &CallerIdentity,
        id: &str,
    ) -> Result<Ward, CoreError> {
        self.require_writer(caller)?;
        let ward = self.store.delete_ward(id).await.map_err(store_to_core)?;

        self.invalidate(ResourceKind::Ward).await;
        self.announce_ward(
            ChangeEvent::deleted(ResourceKind::Ward, &ward.id, &ward.name),
            ward.kind,
        )
        .await;
        Ok(ward)
    }
}
