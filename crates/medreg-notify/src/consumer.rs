//! Inbound mutation consumer.
//!
//! Pulls change events published by other systems and applies them through
//! an [`InboundHandler`]. The loop reconnects on transport failures and
//! settles every delivery exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use medreg_core::event::ChangeEvent;

use crate::error::NotifyError;
use crate::transport::{Delivery, QueueTransport};

/// Default queue for mutations originating on other systems.
pub const INBOUND_QUEUE: &str = "medreg:inbound";

/// Applies one inbound change event.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// # Errors
    ///
    /// An error rejects the message. Rejected messages are dropped, not
    /// redelivered.
    async fn handle(
        &self,
        event: ChangeEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Consumes a queue of change events and applies them through a handler.
///
/// Acknowledges when the handler succeeds, rejects when the payload does
/// not decode or the handler fails.
pub struct InboundConsumer {
    transport: Arc<dyn QueueTransport>,
    queue: String,
    handler: Arc<dyn InboundHandler>,
}

impl InboundConsumer {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        queue: impl Into<String>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        Self {
            transport,
            queue: queue.into(),
            handler,
        }
    }

    /// Runs the consume loop until the stream ends, reconnecting on
    /// transport errors.
    pub async fn run(self) {
        info!(queue = %self.queue, "Starting inbound consumer");

        loop {
            match self.consume_loop().await {
                Ok(()) => {
                    info!(queue = %self.queue, "Inbound consumer stopped");
                    break;
                }
                Err(e) => {
                    error!(
                        queue = %self.queue,
                        error = %e,
                        "Inbound consumer error, reconnecting in 5s"
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn consume_loop(&self) -> Result<(), NotifyError> {
        let mut stream = self.transport.consume(&self.queue).await?;
        while let Some(delivery) = stream.next().await? {
            self.dispatch(delivery).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, delivery: Delivery) -> Result<(), NotifyError> {
        let event: ChangeEvent = match serde_json::from_slice(delivery.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "Discarding undecodable message");
                return delivery.nack().await;
            }
        };

        debug!(
            queue = %self.queue,
            kind = %event.kind,
            resource = %event.resource,
            id = %event.id,
            "Applying inbound change"
        );

        match self.handler.handle(event).await {
            Ok(()) => delivery.ack().await,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "Handler rejected inbound change");
                delivery.nack().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use crate::transport::QueueTransport;
    use medreg_core::model::ResourceKind;

    struct RecordingHandler {
        seen: tokio::sync::Mutex<Vec<ChangeEvent>>,
        fail: bool,
    }

    impl RecordingHandler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: tokio::sync::Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle(
            &self,
            event: ChangeEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.seen.lock().await.push(event);
            if self.fail {
                return Err("handler refused".into());
            }
            Ok(())
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_valid_event_is_applied_and_acked() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = RecordingHandler::new(false);
        let event = ChangeEvent::created(ResourceKind::Hospital, "H-1", "General");
        broker
            .publish("inbox", serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();

        let consumer = InboundConsumer::new(broker.clone(), "inbox", handler.clone());
        let task = tokio::spawn(consumer.run());

        assert!(wait_until(|| broker.ack_count("inbox") == 1).await);
        assert_eq!(broker.nack_count("inbox"), 0);
        assert_eq!(handler.seen.lock().await.as_slice(), &[event]);
        task.abort();
    }

    #[tokio::test]
    async fn test_handler_rejection_nacks_the_delivery() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = RecordingHandler::new(true);
        let event = ChangeEvent::updated(ResourceKind::Ward, "W-404", "Missing");
        broker
            .publish("inbox", serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();

        let consumer = InboundConsumer::new(broker.clone(), "inbox", handler.clone());
        let task = tokio::spawn(consumer.run());

        assert!(wait_until(|| broker.nack_count("inbox") == 1).await);
        assert_eq!(broker.ack_count("inbox"), 0);
        assert_eq!(handler.seen.lock().await.len(), 1);
        task.abort();
    }

    #[tokio::test]
    async fn test_undecodable_payload_never_reaches_the_handler() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = RecordingHandler::new(false);
        broker
            .publish("inbox", b"{not json".to_vec())
            .await
            .unwrap();
        let event = ChangeEvent::deleted(ResourceKind::User, "U-9", "gone");
        broker
            .publish("inbox", serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();

        let consumer = InboundConsumer::new(broker.clone(), "inbox", handler.clone());
        let task = tokio::spawn(consumer.run());

        // Garbage is rejected, the event behind it is still applied.
        assert!(wait_until(|| broker.ack_count("inbox") == 1).await);
        assert_eq!(broker.nack_count("inbox"), 1);
        assert_eq!(handler.seen.lock().await.as_slice(), &[event]);
        task.abort();
    }
}
