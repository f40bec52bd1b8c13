//! Inbound mutation replay.
//!
//! Remote systems announce their own writes on the inbound stream. Those
//! are applied straight to the store and invalidate the cache, but are
//! never re-announced. Creates of records that already exist and deletes
//! of records already gone are no-ops, so a redelivered announcement
//! settles cleanly instead of poisoning the queue.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use medreg_core::error::CoreError;
use medreg_core::event::{ChangeEvent, ChangeKind};
use medreg_core::model::{
    HospitalUpdate, NewHospital, NewUser, NewWard, ResourceKind, UserUpdate, WardUpdate,
};
use medreg_notify::InboundHandler;
use medreg_store::{RecordStore, StoreError};

use super::{RecordService, store_to_core};

fn decode_payload<T: DeserializeOwned>(event: &ChangeEvent) -> Result<T, CoreError> {
    serde_json::from_value(event.payload.clone()).map_err(|e| {
        CoreError::conflict(format!(
            "inbound {} payload does not decode: {e}",
            event.resource
        ))
    })
}

impl RecordService {
    /// Apply a mutation announced by another system.
    ///
    /// # Errors
    ///
    /// Undecodable payloads and updates of missing records fail, which
    /// makes the consumer reject the message. Creates of existing records
    /// and deletes of missing ones succeed without touching the store.
    pub async fn apply_change(&self, event: ChangeEvent) -> Result<(), CoreError> {
        match event.resource {
            ResourceKind::Hospital => self.apply_hospital_change(&event).await?,
            ResourceKind::Ward => self.apply_ward_change(&event).await?,
            ResourceKind::User => self.apply_user_change(&event).await?,
        }
        self.invalidate(event.resource).await;
        Ok(())
    }

    async fn apply_hospital_change(&self, event: &ChangeEvent) -> Result<(), CoreError> {
        match event.kind {
            ChangeKind::Create => {
                let mut new: NewHospital = decode_payload(event)?;
                // The announced id is authoritative.
                new.id = Some(event.id.clone());
                match self.store.create_hospital(new).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::AlreadyExists { .. }) => {
                        debug!(id = %event.id, "Hospital already present, skipping create");
                        Ok(())
                    }
                    Err(e) => Err(store_to_core(e)),
                }
            }
            ChangeKind::Update => {
                let patch: HospitalUpdate = decode_payload(event)?;
                self.store
                    .update_hospital(&event.id, patch)
                    .await
                    .map(|_| ())
                    .map_err(store_to_core)
            }
            ChangeKind::Delete => match self.store.delete_hospital(&event.id).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!(id = %event.id, "Hospital already gone, skipping delete");
                    Ok(())
                }
                Err(e) => Err(store_to_core(e)),
            },
        }
    }

    async fn apply_ward_change(&self, event: &ChangeEvent) -> Result<(), CoreError> {
        match event.kind {
            ChangeKind::Create => {
                let mut new: NewWard = decode_payload(event)?;
                new.id = Some(event.id.clone());
                match self.store.create_ward(new).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::AlreadyExists { .. }) => {
                        debug!(id = %event.id, "Ward already present, skipping create");
                        Ok(())
                    }
                    Err(e) => Err(store_to_core(e)),
                }
            }
            ChangeKind::Update => {
                let patch: WardUpdate = decode_payload(event)?;
                self.store
                    .update_ward(&event.id, patch)
                    .await
                    .map(|_| ())
                    .map_err(store_to_core)
            }
            ChangeKind::Delete => match self.store.delete_ward(&event.id).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!(id = %event.id, "Ward already gone, skipping delete");
                    Ok(())
                }
                Err(e) => Err(store_to_core(e)),
            },
        }
    }

    async fn apply_user_change(&self, event: &ChangeEvent) -> Result<(), CoreError> {
        match event.kind {
            ChangeKind::Create => {
                let mut new: NewUser = decode_payload(event)?;
                new.id = Some(event.id.clone());
                match self.store.create_user(new).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::AlreadyExists { .. }) => {
                        debug!(id = %event.id, "User already present, skipping create");
                        Ok(())
                    }
                    Err(e) => Err(store_to_core(e)),
                }
            }
            ChangeKind::Update => {
                let patch: UserUpdate = decode_payload(event)?;
                self.store
                    .update_user(&event.id, patch)
                    .await
                    .map(|_| ())
                    .map_err(store_to_core)
            }
            ChangeKind::Delete => match self.store.delete_user(&event.id).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!(id = %event.id, "User already gone, skipping delete");
                    Ok(())
                }
                Err(e) => Err(store_to_core(e)),
            },
        }
    }
}

#[async_trait]
impl InboundHandler for RecordService {
    async fn handle(
        &self,
        event: ChangeEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply_change(event).await?;
        Ok(())
    }
}
