//! In-memory backend for tests and ephemeral deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{StateStore, StorageError};

/// Process-local state store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("state_1", &json!({"v": 1})).await.unwrap();
        assert_eq!(store.get("state_1").await.unwrap(), Some(json!({"v": 1})));
        assert_eq!(store.len(), 1);

        store.delete("state_1").await.unwrap();
        assert_eq!(store.get("state_1").await.unwrap(), None);
        store.delete("state_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = MemoryStore::new();
        store.set("state_1", &json!(1)).await.unwrap();
        store.set("state_2", &json!(2)).await.unwrap();
        store.set("other", &json!(3)).await.unwrap();

        let entries = store.scan("state_").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "state_1");
        assert_eq!(entries[1].0, "state_2");
    }
}
