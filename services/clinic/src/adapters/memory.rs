//! services/clinic/src/adapters/memory.rs
//!
//! A process-local `KeyValueStore`. Used by the `memory` storage backend and
//! throughout the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use clinic_core::ports::{KeyValueStore, PortResult};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> PortResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, String)>) -> PortResult<()> {
        // One write guard for the whole batch.
        let mut guard = self.entries.write().await;
        guard.extend(entries);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
