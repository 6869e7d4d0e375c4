use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async locks
///
/// Serializes the read-modify-write cycle on one store key inside this
/// process. Different keys never contend.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop table entries nobody is holding or waiting on
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of keys in the table
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if the table is empty
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
