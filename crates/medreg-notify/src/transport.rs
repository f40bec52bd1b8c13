//! The queue transport abstraction.
//!
//! A transport moves opaque byte payloads through named queues. Consuming
//! hands back [`Delivery`] values whose `ack`/`nack` methods take the
//! delivery by value, so every message is settled exactly once and the
//! borrow checker rejects a second attempt.

use async_trait::async_trait;

use crate::error::NotifyError;

/// Message transport over named queues.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Publishes a payload to `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error when the broker rejects the message or is
    /// unreachable. Callers decide whether that is fatal.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), NotifyError>;

    /// Opens a consuming stream over `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be established.
    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, NotifyError>;
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait DeliveryStream: Send {
    /// Waits for the next delivery. `None` means the stream is closed and
    /// will not produce again.
    async fn next(&mut self) -> Result<Option<Delivery>, NotifyError>;
}

/// Backend hook for settling one delivery.
#[async_trait]
pub(crate) trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), NotifyError>;
    async fn nack(self: Box<Self>) -> Result<(), NotifyError>;
}

/// One received message, owned until settled.
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub(crate) fn new(payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    /// The raw message payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Confirms the message as processed.
    pub async fn ack(self) -> Result<(), NotifyError> {
        self.acker.ack().await
    }

    /// Rejects the message. Rejected messages are dropped, not redelivered.
    pub async fn nack(self) -> Result<(), NotifyError> {
        self.acker.nack().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
