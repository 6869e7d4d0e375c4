use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::store::StateStore;
use crate::Result;

/// In-memory state store
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no key is held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool> {
        match (self.values.entry(key.to_string()), expected) {
            (Entry::Occupied(mut entry), Some(expected)) if entry.get() == expected => {
                entry.insert(value.to_string());
                Ok(true)
            }
            (Entry::Vacant(entry), None) => {
                entry.insert(value.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryStore::new();

        assert!(store.compare_and_set("k", None, "v1").await.unwrap());
        assert!(!store.compare_and_set("k", None, "v2").await.unwrap());
        assert!(!store.compare_and_set("k", Some("stale"), "v2").await.unwrap());
        assert!(store.compare_and_set("k", Some("v1"), "v2").await.unwrap());
        assert!(!store.compare_and_set("missing", Some("v1"), "v2").await.unwrap());

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
