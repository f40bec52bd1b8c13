//! Hospital operations.

use medreg_core::error::CoreError;
use medreg_core::event::ChangeEvent;
use medreg_core::model::{
    CallerIdentity, Hospital, HospitalRecord, HospitalUpdate, NewHospital, ResourceKind,
};
use medreg_core::scope::{list_scope, record_cache_key};
use medreg_store::RecordStore;

use super::{RecordService, store_to_core};
use crate::assets::HOSPITAL_BUCKET;

impl RecordService {
    /// List the hospitals visible to `caller`, wards embedded.
    ///
    /// Each role scope has its own cache partition, so an admin's
    /// organization-bound snapshot can never leak into another caller's
    /// view.
    ///
    /// # Errors
    ///
    /// `InvalidScope` for callers that may not list, `Storage` when the
    /// store is unreachable.
    pub async fn list_hospitals(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<HospitalRecord>, CoreError> {
        let scope = list_scope(ResourceKind::Hospital, caller)?;
        if let Some(records) = self
            .cache_lookup::<Vec<HospitalRecord>>(&scope.cache_key)
            .await
        {
            return Ok(records);
        }

        let records = self
            .store
            .list_hospitals(&scope.filter)
            .await
            .map_err(store_to_core)?;

        // Empty results are never cached; the next read checks the store
        // again.
        if !records.is_empty() {
            self.cache_store(&scope.cache_key, &records, self.list_ttl)
                .await;
        }
        Ok(records)
    }

    /// Read one hospital with its wards.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown.
    pub async fn get_hospital(&self, id: &str) -> Result<HospitalRecord, CoreError> {
        let key = record_cache_key(ResourceKind::Hospital, id);
        if let Some(record) = self.cache_lookup::<HospitalRecord>(&key).await {
            return Ok(record);
        }

        let record = self
            .store
            .get_hospital(id)
            .await
            .map_err(store_to_core)?
            .ok_or_else(|| CoreError::not_found("hospital", id))?;

        self.cache_store(&key, &record, self.record_ttl).await;
        Ok(record)
    }

    /// Create a hospital and announce it to the device fleet.
    pub async fn create_hospital(
        &self,
        caller: &CallerIdentity,
        new: NewHospital,
    ) -> Result<Hospital, CoreError> {
        self.require_writer(caller)?;
        let hospital = self
            .store
            .create_hospital(new)
            .await
            .map_err(store_to_core)?;

        self.invalidate(ResourceKind::Hospital).await;
        self.announce(ChangeEvent::created(
            ResourceKind::Hospital,
            &hospital.id,
            &hospital.name,
        ))
        .await;
        Ok(hospital)
    }

    /// Apply a partial update and return the new state.
    pub async fn update_hospital(
        &self,
        caller: &CallerIdentity,
        id: &str,
        patch: HospitalUpdate,
    ) -> Result<Hospital, CoreError> {
        self.require_writer(caller)?;
        let hospital = self
            .store
            .update_hospital(id, patch)
            .await
            .map_err(store_to_core)?;

        self.invalidate(ResourceKind::Hospital).await;
        self.announce(ChangeEvent::updated(
            ResourceKind::Hospital,
            &hospital.id,
            &hospital.name,
        ))
        .await;
        Ok(hospital)
    }

    /// Delete a hospital and return the removed record.
    ///
    /// The stored picture is released after the delete commits; a failed
    /// release is logged, not surfaced.
    ///
    /// # Errors
    ///
    /// `Conflict` while wards still reference the hospital.
    pub async fn delete_hospital(
        &self,
        caller: &CallerIdentity,
        id: &str,
    ) -> Result<Hospital, CoreError> {
        self.require_writer(caller)?;
        let hospital = self
            .store
            .delete_hospital(id)
            .await
            .map_err(store_to_core)?;

        self.invalidate(ResourceKind::Hospital).await;
        self.announce(ChangeEvent::deleted(
            ResourceKind::Hospital,
            &hospital.id,
            &hospital.name,
        ))
        .await;
        self.release_picture(HOSPITAL_BUCKET, hospital.picture.as_deref())
            .await;
        Ok(hospital)
    }
}
