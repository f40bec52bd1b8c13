//! Queue messaging for the registry.
//!
//! Outbound: [`Notifier`] announces local writes to the device and legacy
//! queues. Inbound: [`InboundConsumer`] applies mutations published by
//! other systems. Both sides speak [`ChangeEvent`] JSON over a
//! [`QueueTransport`], with Redis Streams in production and an in-memory
//! broker for tests and single-instance setups.
//!
//! [`ChangeEvent`]: medreg_core::event::ChangeEvent

pub mod consumer;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod redis;
pub mod transport;

pub use consumer::{INBOUND_QUEUE, InboundConsumer, InboundHandler};
pub use error::NotifyError;
pub use memory::InMemoryBroker;
pub use notifier::{DEVICE_QUEUE, LEGACY_QUEUE, Notifier};
pub use redis::RedisStreamTransport;
pub use transport::{Delivery, DeliveryStream, QueueTransport};
