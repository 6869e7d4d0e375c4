//! In-process bus backed by one `tokio::sync::broadcast` channel per subject

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{trace, warn};

use crate::bus::{EventBus, Message, Subscription};
use crate::Result;

/// Default buffer capacity of each subject channel
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus
///
/// Every subscriber of a subject receives every message published on it
/// after it subscribed. Slow subscribers that fall more than the channel
/// capacity behind lose the oldest messages.
pub struct MemoryBus {
    capacity: usize,
    subjects: RwLock<HashMap<String, broadcast::Sender<Message>>>,
}

impl MemoryBus {
    /// Create a bus with a specific per-subject capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subjects: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<Message> {
        if let Some(sender) = self.subjects.read().get(subject) {
            return sender.clone();
        }
        self.subjects
            .write()
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        // A send error only means nobody is listening.
        match self.sender(subject).send(Message::new(subject, payload)) {
            Ok(receivers) => trace!(subject, receivers, "Published"),
            Err(_) => trace!(subject, "Published with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let receiver = self.sender(subject).subscribe();
        let owned_subject = subject.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let message = match item {
                Ok(message) => Some(message),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(subject = %owned_subject, skipped, "Subscriber lagged, messages dropped");
                    None
                }
            };
            futures::future::ready(message)
        });

        Ok(Subscription::new(subject, stream.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = MemoryBus::default();
        let mut subscription = bus.subscribe("execution.create").await.unwrap();

        bus.publish("execution.create", Bytes::from_static(b"{}")).await.unwrap();

        let message = subscription.next().await.unwrap();
        assert_eq!(message.subject, "execution.create");
        assert_eq!(message.payload, Bytes::from_static(b"{}"));
        assert_eq!(subscription.subject(), "execution.create");
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let bus = MemoryBus::default();
        let mut done = bus.subscribe("executions.create.done").await.unwrap();

        bus.publish("executions.create.error", Bytes::from_static(b"x")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(50), done.next()).await;
        assert!(received.is_err(), "done subscriber must not see error messages");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = MemoryBus::default();
        bus.publish("nobody", Bytes::from_static(b"x")).await.unwrap();

        let mut late = bus.subscribe("nobody").await.unwrap();
        let received = tokio::time::timeout(Duration::from_millis(50), late.next()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let bus = MemoryBus::default();
        let mut first = bus.subscribe("s").await.unwrap();
        let mut second = bus.subscribe("s").await.unwrap();

        bus.publish("s", Bytes::from_static(b"1")).await.unwrap();

        assert_eq!(first.next().await.unwrap().payload, Bytes::from_static(b"1"));
        assert_eq!(second.next().await.unwrap().payload, Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_dropped_messages() {
        let bus = MemoryBus::new(2);
        let mut subscription = bus.subscribe("s").await.unwrap();

        for i in 0..4u8 {
            bus.publish("s", Bytes::from(vec![i])).await.unwrap();
        }

        assert_eq!(subscription.next().await.unwrap().payload, Bytes::from(vec![2u8]));
        assert_eq!(subscription.next().await.unwrap().payload, Bytes::from(vec![3u8]));
    }
}
