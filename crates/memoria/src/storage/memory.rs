//! In-memory durable store
//!
//! Reference [`DurableStore`] implementation backed by an ordered map. Useful
//! for tests, demos, and single-process deployments that accept losing the
//! durable tier on restart.

use super::DurableStore;
use crate::error::MemoriaResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Ordered, process-local record store
pub struct InMemoryDurableStore {
    records: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl InMemoryDurableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of records (test/diagnostic helper)
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn set(&self, key: &str, value: serde_json::Value) -> MemoriaResult<()> {
        self.records.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> MemoriaResult<Option<serde_json::Value>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> MemoriaResult<bool> {
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> MemoriaResult<Vec<(String, serde_json::Value)>> {
        let records = self.records.read().await;
        let matching = records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(matching)
    }

    async fn delete_prefix(&self, prefix: &str) -> MemoriaResult<usize> {
        let mut records = self.records.write().await;
        let keys: Vec<String> = records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            records.remove(key);
        }

        Ok(keys.len())
    }

    async fn count(&self, prefix: &str) -> MemoriaResult<usize> {
        let records = self.records.read().await;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryDurableStore::new();

        store.set("a::1", json!({"v": 1})).await.unwrap();
        assert_eq!(store.get("a::1").await.unwrap(), Some(json!({"v": 1})));

        assert!(store.delete("a::1").await.unwrap());
        assert!(!store.delete("a::1").await.unwrap());
        assert_eq!(store.get("a::1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_prefix_is_ordered() {
        let store = InMemoryDurableStore::new();

        store.set("c::item::0002", json!(2)).await.unwrap();
        store.set("c::item::0001", json!(1)).await.unwrap();
        store.set("c::item::0003", json!(3)).await.unwrap();
        store.set("d::item::0001", json!(99)).await.unwrap();

        let scanned = store.scan_prefix("c::item::").await.unwrap();
        let values: Vec<i64> = scanned.iter().map(|(_, v)| v.as_i64().unwrap()).collect();

        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = InMemoryDurableStore::new();

        store.set("c::item::1", json!(1)).await.unwrap();
        store.set("c::item::2", json!(2)).await.unwrap();
        store.set("c::meta", json!("keep")).await.unwrap();

        let removed = store.delete_prefix("c::item::").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("c::").await.unwrap(), 1);
    }
}
