//! Redis state store
//!
//! Plain `GET`/`SET` without expiry. Conditional writes run as a Lua script
//! so the compare and the write are atomic on the server.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use crate::store::{redact_url, StateStore};
use crate::{ExecutionsError, Result};

const COMPARE_AND_SET: &str = r"
local current = redis.call('GET', KEYS[1])
local matches
if ARGV[1] == '0' then
    matches = (current == false)
else
    matches = (current == ARGV[2])
end
if matches then
    redis.call('SET', KEYS[1], ARGV[3])
    return 1
end
return 0
";

/// Store backed by a Redis server
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    cas_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| ExecutionsError::Store(format!("Failed to create Redis client: {}", e)))?;

        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| ExecutionsError::Store(format!("Failed to connect to Redis: {}", e)))?;

        debug!(url = %redact_url(url), "Redis store connected");

        Ok(Self {
            connection_manager,
            cas_script: Script::new(COMPARE_AND_SET),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| ExecutionsError::Store(format!("Redis GET {} failed: {}", key, e)))?;

        debug!(key, hit = value.is_some(), "Store GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| ExecutionsError::Store(format!("Redis SET {} failed: {}", key, e)))?;

        debug!(key, bytes = value.len(), "Store SET");
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let written: i32 = self
            .cas_script
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(""))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ExecutionsError::Store(format!("Redis compare-and-set {} failed: {}", key, e)))?;

        debug!(key, written = written == 1, "Store CAS");
        Ok(written == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".to_string())
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisStore::connect("not a url").await;
        assert!(matches!(result, Err(ExecutionsError::Store(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_get_set_and_compare() {
        let store = RedisStore::connect(&redis_url()).await.unwrap();
        assert!(store.health_check().await.unwrap());

        let key = format!("GPBExecutions_test_{}", uuid::Uuid::new_v4());
        assert_eq!(store.get(&key).await.unwrap(), None);

        assert!(store.compare_and_set(&key, None, "v1").await.unwrap());
        assert!(!store.compare_and_set(&key, None, "v2").await.unwrap());
        assert!(!store.compare_and_set(&key, Some("stale"), "v2").await.unwrap());
        assert!(store.compare_and_set(&key, Some("v1"), "v2").await.unwrap());

        store.set(&key, "v3").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some("v3".to_string()));
    }
}
