use async_trait::async_trait;
use dashmap::DashMap;
use matchcast_models::Result;
use serde_json::Value;

use crate::store::StateStore;

/// In-process store for tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_json, put_json};
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("daily:2024-01-15:progress", json!({"done": false})).await.unwrap();

        let value = store.get("daily:2024-01-15:progress").await.unwrap();
        assert_eq!(value, Some(json!({"done": false})));

        assert!(store.delete("daily:2024-01-15:progress").await.unwrap());
        assert!(!store.delete("daily:2024-01-15:progress").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_prefix_filtered_and_sorted() {
        let store = MemoryStore::new();
        for key in ["daily:2024-01-15:progress", "daily:2024-01-15:aggregate", "daily:2024-01-16:aggregate"] {
            store.put(key, json!(1)).await.unwrap();
        }

        let keys = store.list("daily:2024-01-15:").await.unwrap();
        assert_eq!(keys, vec!["daily:2024-01-15:aggregate", "daily:2024-01-15:progress"]);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryStore::new();
        put_json(&store, "numbers", &vec![1, 2, 3]).await.unwrap();

        let numbers: Option<Vec<u32>> = get_json(&store, "numbers").await.unwrap();
        assert_eq!(numbers, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = get_json(&store, "missing").await.unwrap();
        assert_eq!(missing, None);

        store.put("numbers", json!("not a list")).await.unwrap();
        let bad: matchcast_models::Result<Option<Vec<u32>>> = get_json(&store, "numbers").await;
        assert!(bad.is_err());
    }
}
