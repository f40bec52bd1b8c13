//! In-memory queue transport.
//!
//! Backs tests and single-instance development deployments. Every queue
//! keeps a journal of published payloads and counts settlements, so tests
//! can assert on exactly what crossed the wire.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::NotifyError;
use crate::transport::{Acker, Delivery, DeliveryStream, QueueTransport};

struct QueueState {
    tx: UnboundedSender<Vec<u8>>,
    rx: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    published: Mutex<Vec<Vec<u8>>>,
    acked: AtomicUsize,
    nacked: AtomicUsize,
}

/// Process-local broker with one exclusive consumer per queue.
///
/// Dropping a consuming stream hands the subscription back, so a later
/// `consume` resumes with any payloads still buffered.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, Arc<QueueState>>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue: &str) -> Arc<QueueState> {
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Arc::new(QueueState {
                    tx,
                    rx: Mutex::new(Some(rx)),
                    published: Mutex::new(Vec::new()),
                    acked: AtomicUsize::new(0),
                    nacked: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Everything ever published to `queue`, in order.
    pub async fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        match self.queues.get(queue) {
            Some(state) => state.published.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Number of acknowledged deliveries on `queue`.
    #[must_use]
    pub fn ack_count(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|state| state.acked.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of rejected deliveries on `queue`.
    #[must_use]
    pub fn nack_count(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|state| state.nacked.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueTransport for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), NotifyError> {
        let state = self.state(queue);
        state.published.lock().await.push(payload.clone());
        state
            .tx
            .send(payload)
            .map_err(|_| NotifyError::Publish(format!("queue '{queue}' is closed")))
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, NotifyError> {
        let state = self.state(queue);
        let rx = state.rx.lock().await.take().ok_or_else(|| {
            NotifyError::Consume(format!("queue '{queue}' already has an active consumer"))
        })?;
        Ok(Box::new(MemoryDeliveryStream {
            rx: Some(rx),
            state,
        }))
    }
}

struct MemoryDeliveryStream {
    rx: Option<UnboundedReceiver<Vec<u8>>>,
    state: Arc<QueueState>,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next(&mut self) -> Result<Option<Delivery>, NotifyError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(payload) => Ok(Some(Delivery::new(
                payload,
                Box::new(MemoryAcker {
                    state: self.state.clone(),
                }),
            ))),
            None => Ok(None),
        }
    }
}

impl Drop for MemoryDeliveryStream {
    fn drop(&mut self) {
        // Hand the subscription back for the next consumer.
        if let Ok(mut slot) = self.state.rx.try_lock() {
            if let Some(rx) = self.rx.take() {
                *slot = Some(rx);
            }
        }
    }
}

struct MemoryAcker {
    state: Arc<QueueState>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), NotifyError> {
        self.state.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), NotifyError> {
        self.state.nacked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
