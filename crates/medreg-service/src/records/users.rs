//! User operations.
//!
//! Callers only ever see the sanitized [`UserRecord`] view; the password
//! hash stays between the store and the authentication boundary.

use medreg_core::error::CoreError;
use medreg_core::event::ChangeEvent;
use medreg_core::model::{
    CallerIdentity, NewUser, ResourceKind, User, UserCredentials, UserRecord, UserUpdate,
};
use medreg_core::scope::{list_scope, record_cache_key};
use medreg_store::RecordStore;

use super::{RecordService, store_to_core};
use crate::assets::USER_BUCKET;

impl RecordService {
    /// List the users visible to `caller`, ordered by role rank.
    pub async fn list_users(
        &self,
        caller: &CallerIdentity,
    ) -> Result<Vec<UserRecord>, CoreError> {
        let scope = list_scope(ResourceKind::User, caller)?;
        if let Some(records) = self
            .cache_lookup::<Vec<UserRecord>>(&scope.cache_key)
            .await
        {
            return Ok(records);
        }

        let records = self
            .store
            .list_users(&scope.filter)
            .await
            .map_err(store_to_core)?;

        if !records.is_empty() {
            self.cache_store(&scope.cache_key, &records, self.list_ttl)
                .await;
        }
        Ok(records)
    }

    /// Read one user with ward and hospital context.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown.
    pub async fn get_user(&self, id: &str) -> Result<UserRecord, CoreError> {
        let key = record_cache_key(ResourceKind::User, id);
        if let Some(record) = self.cache_lookup::<UserRecord>(&key).await {
            return Ok(record);
        }

        let record = self
            .store
            .get_user(id)
            .await
            .map_err(store_to_core)?
            .ok_or_else(|| CoreError::not_found("user", id))?;

        self.cache_store(&key, &record, self.record_ttl).await;
        Ok(record)
    }

    /// Create a user under an existing ward.
    ///
    /// # Errors
    ///
    /// `Conflict` on a duplicate username or a missing ward.
    pub async fn create_user(
        &self,
        caller: &CallerIdentity,
        new: NewUser,
    ) -> Result<UserRecord, CoreError> {
        self.require_writer(caller)?;
        let user = self.store.create_user(new).await.map_err(store_to_core)?;

        self.invalidate(ResourceKind::User).await;
        self.announce(ChangeEvent::created(
            ResourceKind::User,
            &user.id,
            &user.username,
        ))
        .await;
        self.user_view(user).await
    }

    /// Apply a partial update and return the new state.
    pub async fn update_user(
        &self,
        caller: &CallerIdentity,
        id: &str,
        patch: UserUpdate,
    ) -> Result<UserRecord, CoreError> {
        self.require_writer(caller)?;
        let user = self
            .store
            .update_user(id, patch)
            .await
            .map_err(store_to_core)?;

        self.invalidate(ResourceKind::User).await;
        self.announce(ChangeEvent::updated(
            ResourceKind::User,
            &user.id,
            &user.username,
        ))
        .await;
        self.user_view(user).await
    }

    /// Delete a user and return the removed record.
    ///
    /// The stored picture is released after the delete commits; a failed
    /// release is logged, not surfaced.
    pub async fn delete_user(
        &self,
        caller: &CallerIdentity,
        id: &str,
    ) -> Result<User, CoreError> {
        self.require_writer(caller)?;
        let user = self.store.delete_user(id).await.map_err(store_to_core)?;

        self.invalidate(ResourceKind::User).await;
        self.announce(ChangeEvent::deleted(
            ResourceKind::User,
            &user.id,
            &user.username,
        ))
        .await;
        self.release_picture(USER_BUCKET, user.picture.as_deref())
            .await;
        Ok(user)
    }

    /// Credential lookup for the authentication boundary. Always reads the
    /// store; credentials are never cached.
    pub async fn user_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, CoreError> {
        self.store
            .user_credentials(username)
            .await
            .map_err(store_to_core)
    }

    /// Assemble the sanitized view for a freshly written user. A ward
    /// cannot be deleted while users reference it, so a missing context
    /// means the store lost integrity.
    async fn user_view(&self, user: User) -> Result<UserRecord, CoreError> {
        let context = self
            .store
            .get_ward(&user.ward_id)
            .await
            .map_err(store_to_core)?
            .ok_or_else(|| {
                CoreError::storage(format!(
                    "ward {} missing for user {}",
                    user.ward_id, user.id
                ))
            })?;
        Ok(UserRecord::assemble(user, context.ward, context.hospital))
    }
}
