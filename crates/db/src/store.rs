use async_trait::async_trait;
use matchcast_models::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// The pipeline's only durable memory: plain get/put/delete/list over JSON values.
/// No locking or transactions; callers assume one writer per date.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

pub async fn get_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize + Sync>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.put(key, value).await
}
