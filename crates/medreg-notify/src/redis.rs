//! Redis Streams queue transport.
//!
//! Publishing and settlement go through the shared connection pool. Each
//! consuming stream opens its own connection, because `XREADGROUP` with
//! `BLOCK` would stall every other user of a pooled connection. Consumer
//! groups give at-least-once delivery with explicit acknowledgement;
//! rejected entries are acknowledged and dropped, never redelivered.

use std::collections::VecDeque;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::transport::{Acker, Delivery, DeliveryStream, QueueTransport};

/// Queue transport on Redis Streams with consumer groups.
pub struct RedisStreamTransport {
    pool: Pool,
    url: String,
    group: String,
    consumer: String,
}

impl RedisStreamTransport {
    /// Creates a transport.
    ///
    /// `url` is used for dedicated consumer connections; `group` and
    /// `consumer` name this instance inside the consumer group.
    pub fn new(
        pool: Pool,
        url: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            url: url.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }
}

#[async_trait]
impl QueueTransport for RedisStreamTransport {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), NotifyError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| NotifyError::Pool(e.to_string()))?;

        let _: () = conn
            .xadd(queue, "*", &[("payload", payload.as_slice())])
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;

        debug!(stream = %queue, bytes = payload.len(), "Published to stream");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, NotifyError> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| NotifyError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| NotifyError::Connection(e.to_string()))?;

        // Groups survive restarts; BUSYGROUP just means it is already there.
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(queue, &self.group, "$")
            .await;
        if let Err(e) = created {
            if e.code() != Some("BUSYGROUP") {
                return Err(NotifyError::Consume(e.to_string()));
            }
        }

        info!(
            stream = %queue,
            group = %self.group,
            consumer = %self.consumer,
            "Joined consumer group"
        );

        Ok(Box::new(RedisDeliveryStream {
            conn,
            pool: self.pool.clone(),
            queue: queue.to_string(),
            group: self.group.clone(),
            consumer: self.consumer.clone(),
            buffer: VecDeque::new(),
        }))
    }
}

struct RedisDeliveryStream {
    conn: MultiplexedConnection,
    pool: Pool,
    queue: String,
    group: String,
    consumer: String,
    buffer: VecDeque<(String, Vec<u8>)>,
}

#[async_trait]
impl DeliveryStream for RedisDeliveryStream {
    async fn next(&mut self) -> Result<Option<Delivery>, NotifyError> {
        loop {
            if let Some((id, payload)) = self.buffer.pop_front() {
                return Ok(Some(Delivery::new(
                    payload,
                    Box::new(RedisAcker {
                        pool: self.pool.clone(),
                        queue: self.queue.clone(),
                        group: self.group.clone(),
                        id,
                    }),
                )));
            }

            let options = StreamReadOptions::default()
                .group(&self.group, &self.consumer)
                .count(10)
                .block(5_000);
            let reply: StreamReadReply = self
                .conn
                .xread_options(&[self.queue.as_str()], &[">"], &options)
                .await
                .map_err(|e| NotifyError::Consume(e.to_string()))?;

            for key in reply.keys {
                for entry in key.ids {
                    match entry.get::<Vec<u8>>("payload") {
                        Some(payload) => self.buffer.push_back((entry.id.clone(), payload)),
                        None => {
                            warn!(
                                stream = %self.queue,
                                id = %entry.id,
                                "Entry has no payload field, dropping"
                            );
                            settle(&self.pool, &self.queue, &self.group, &entry.id).await?;
                        }
                    }
                }
            }
            // An empty reply is a BLOCK timeout; read again.
        }
    }
}

struct RedisAcker {
    pool: Pool,
    queue: String,
    group: String,
    id: String,
}

#[async_trait]
impl Acker for RedisAcker {
    async fn ack(self: Box<Self>) -> Result<(), NotifyError> {
        settle(&self.pool, &self.queue, &self.group, &self.id).await
    }

    async fn nack(self: Box<Self>) -> Result<(), NotifyError> {
        // Rejected entries are acknowledged too, so they do not sit in the
        // pending list forever.
        warn!(stream = %self.queue, id = %self.id, "Dropping rejected entry");
        settle(&self.pool, &self.queue, &self.group, &self.id).await
    }
}

async fn settle(pool: &Pool, queue: &str, group: &str, id: &str) -> Result<(), NotifyError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| NotifyError::Pool(e.to_string()))?;
    let _: () = conn
        .xack(queue, group, &[id])
        .await
        .map_err(|e| NotifyError::Settle(e.to_string()))?;
    Ok(())
}
