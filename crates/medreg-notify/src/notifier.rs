//! Outbound change announcements.

use std::sync::Arc;

use tracing::debug;

use medreg_core::event::ChangeEvent;
use medreg_core::model::WardKind;

use crate::error::NotifyError;
use crate::transport::QueueTransport;

/// Default queue for the device fleet.
pub const DEVICE_QUEUE: &str = "medreg:device";

/// Default queue for the legacy temperature-log bridge.
pub const LEGACY_QUEUE: &str = "medreg:legacy";

/// Publishes change events to the downstream queues.
///
/// Hospital and user changes always go to the device queue. Ward changes
/// are routed by ward kind: LEGACY wards feed the legacy bridge, everything
/// else feeds the devices.
pub struct Notifier {
    transport: Arc<dyn QueueTransport>,
    device_queue: String,
    legacy_queue: String,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        device_queue: impl Into<String>,
        legacy_queue: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            device_queue: device_queue.into(),
            legacy_queue: legacy_queue.into(),
        }
    }

    /// Creates a notifier on the default queue names.
    pub fn with_default_queues(transport: Arc<dyn QueueTransport>) -> Self {
        Self::new(transport, DEVICE_QUEUE, LEGACY_QUEUE)
    }

    /// Announces a hospital or user change to the device queue.
    ///
    /// # Errors
    ///
    /// Returns an error when the event cannot be serialized or the broker
    /// rejects it. Announcements are advisory; callers usually log and
    /// move on.
    pub async fn publish_change(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        self.publish_to(&self.device_queue, event).await
    }

    /// Announces a ward change, routed by the ward's kind.
    pub async fn publish_ward_change(
        &self,
        event: &ChangeEvent,
        kind: WardKind,
    ) -> Result<(), NotifyError> {
        let queue = match kind {
            WardKind::Legacy => &self.legacy_queue,
            WardKind::Standard => &self.device_queue,
        };
        self.publish_to(queue, event).await
    }

    async fn publish_to(&self, queue: &str, event: &ChangeEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_vec(event).map_err(|e| NotifyError::Serialization(e.to_string()))?;
        self.transport.publish(queue, payload).await?;
        debug!(
            queue = %queue,
            kind = %event.kind,
            resource = %event.resource,
            id = %event.id,
            "Queued change event"
        );
        Ok(())
    }
}
