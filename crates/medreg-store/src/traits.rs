//! The record store abstraction.
//!
//! Backends own referential integrity (hospital 1:N ward 1:N user), the
//! canonical result orderings, and the assembly of embedded views. Callers
//! get joins pre-assembled; nothing upstream stitches records together.

use async_trait::async_trait;

use medreg_core::model::{
    Hospital, HospitalRecord, HospitalUpdate, NewHospital, NewUser, NewWard, User,
    UserCredentials, UserRecord, UserUpdate, Ward, WardRecord, WardUpdate,
};
use medreg_core::scope::ScopeFilter;

use crate::error::StoreError;

/// Relational store for the hospital / ward / user hierarchy.
///
/// List results are ordered: hospitals and wards by `sequence` ascending,
/// users by role rank ascending. Embedded collections follow the same
/// orderings. Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ==================== Hospitals ====================

    /// Creates a hospital. Generates an id when the payload carries none.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is already taken.
    async fn create_hospital(&self, new: NewHospital) -> Result<Hospital, StoreError>;

    /// Lists hospitals visible under `filter`, wards embedded.
    async fn list_hospitals(&self, filter: &ScopeFilter)
    -> Result<Vec<HospitalRecord>, StoreError>;

    /// Reads one hospital with its wards. `None` if absent.
    async fn get_hospital(&self, id: &str) -> Result<Option<HospitalRecord>, StoreError>;

    /// Applies a partial update and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the hospital does not exist.
    async fn update_hospital(&self, id: &str, patch: HospitalUpdate)
    -> Result<Hospital, StoreError>;

    /// Deletes a hospital and returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` while wards still reference it.
    async fn delete_hospital(&self, id: &str) -> Result<Hospital, StoreError>;

    // ==================== Wards ====================

    /// Creates a ward under an existing hospital.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` if the hospital is missing.
    async fn create_ward(&self, new: NewWard) -> Result<Ward, StoreError>;

    /// Lists wards visible under `filter`, owning hospital embedded.
    async fn list_wards(&self, filter: &ScopeFilter) -> Result<Vec<WardRecord>, StoreError>;

    /// Reads one ward with its hospital. `None` if absent.
    async fn get_ward(&self, id: &str) -> Result<Option<WardRecord>, StoreError>;

    /// Applies a partial update; a changed `hospital_id` must reference an
    /// existing hospital.
    async fn update_ward(&self, id: &str, patch: WardUpdate) -> Result<Ward, StoreError>;

    /// Deletes a ward and returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` while users still reference it.
    async fn delete_ward(&self, id: &str) -> Result<Ward, StoreError>;

    // ==================== Users ====================

    /// Creates a user under an existing ward.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` on a duplicate username and
    /// `StoreError::ForeignKey` if the ward is missing.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    /// Lists users whose owning hospital is visible under `filter`.
    async fn list_users(&self, filter: &ScopeFilter) -> Result<Vec<UserRecord>, StoreError>;

    /// Reads one user with ward and hospital context. `None` if absent.
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Applies a partial update, re-checking username uniqueness and the
    /// ward relation when those fields change.
    async fn update_user(&self, id: &str, patch: UserUpdate) -> Result<User, StoreError>;

    /// Deletes a user and returns the removed record.
    async fn delete_user(&self, id: &str) -> Result<User, StoreError>;

    /// Credential lookup for the authentication boundary. Reads fresh,
    /// never through the cache.
    async fn user_credentials(&self, username: &str)
    -> Result<Option<UserCredentials>, StoreError>;
}
