//! Redis pub/sub bus
//!
//! Subjects map one-to-one onto Redis channels. Publishing goes through a
//! shared `ConnectionManager`; each subscription owns a dedicated pub/sub
//! connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, trace, warn};

use crate::bus::{EventBus, Message, Subscription};
use crate::store::redact_url;
use crate::{ExecutionsError, Result};

/// Bus backed by Redis channels
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    connection_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisBus {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| ExecutionsError::Bus(format!("Failed to create Redis client: {}", e)))?;

        let connection_manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| ExecutionsError::Bus(format!("Failed to connect to Redis: {}", e)))?;

        debug!(url = %redact_url(url), "Redis bus connected");

        Ok(Self {
            client,
            connection_manager,
        })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let receivers: i64 = conn
            .publish(subject, &payload[..])
            .await
            .map_err(|e| ExecutionsError::Bus(format!("Redis PUBLISH failed: {}", e)))?;

        trace!(subject, receivers, "Published");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| ExecutionsError::Bus(format!("Failed to open pub/sub connection: {}", e)))?;

        pubsub
            .subscribe(subject)
            .await
            .map_err(|e| ExecutionsError::Bus(format!("Redis SUBSCRIBE {} failed: {}", subject, e)))?;

        debug!(subject, "Subscribed");

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let channel = msg.get_channel_name().to_string();
            let message = match msg.get_payload::<Vec<u8>>() {
                Ok(payload) => Some(Message::new(channel, payload)),
                Err(e) => {
                    warn!(subject = %channel, error = %e, "Dropping unreadable pub/sub payload");
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
    use std::env;
    use std::time::Duration;

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string())
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisBus::connect("not a url").await;
        assert!(matches!(result, Err(ExecutionsError::Bus(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_publish_and_receive() {
        let bus = RedisBus::connect(&redis_url()).await.unwrap();
        let mut subscription = bus.subscribe("executions.test.bus").await.unwrap();

        bus.publish("executions.test.bus", Bytes::from_static(b"hello")).await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.subject, "executions.test.bus");
        assert_eq!(message.payload, Bytes::from_static(b"hello"));
    }
}
