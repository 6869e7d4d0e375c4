//! Publish/subscribe transport
//!
//! Delivery is at-most-once and best-effort: a message published while a
//! subject has no subscriber is dropped, and there is no ordering guarantee
//! across subjects.

mod memory;
pub mod redis;

pub use memory::MemoryBus;
pub use self::redis::RedisBus;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use crate::Result;

/// A message received from the bus
#[derive(Debug, Clone)]
pub struct Message {
    /// Local id used to correlate log lines
    pub id: Uuid,
    pub subject: String,
    pub payload: Bytes,
    /// Local receipt time, used to log queueing delay
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Wrap a payload received on `subject`
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Stream of messages for one subject
pub struct Subscription {
    subject: String,
    stream: BoxStream<'static, Message>,
}

impl Subscription {
    /// Wrap a message stream
    pub fn new(subject: impl Into<String>, stream: BoxStream<'static, Message>) -> Self {
        Self {
            subject: subject.into(),
            stream,
        }
    }

    /// Subject this subscription listens on
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next message, `None` once the bus closes the subscription
    pub async fn next(&mut self) -> Option<Message> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("stream", &"BoxStream")
            .finish()
    }
}

/// Publish/subscribe transport used by the orchestrator
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload on a subject
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Subscribe to a subject
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;
}
