//! Errors raised by queue transports and the consumer loop.

/// Errors that can occur while publishing, consuming, or settling messages.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Queue pool error: {0}")]
    Pool(String),

    #[error("Queue connection error: {0}")]
    Connection(String),

    #[error("Queue publish error: {0}")]
    Publish(String),

    #[error("Queue consume error: {0}")]
    Consume(String),

    #[error("Queue settle error: {0}")]
    Settle(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue stream ended")]
    StreamEnded,
}
