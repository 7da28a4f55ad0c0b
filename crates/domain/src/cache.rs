use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::ports::store::DurableStore;
use crate::versioned::VersionedValue;

/// Durable key -> `VersionedValue` store with an authoritative in-memory
/// layer. Writes are visible to subsequent reads immediately; a failure to
/// persist is logged and does not fail the logical operation, the in-memory
/// value remains authoritative for the process lifetime.
#[derive(Clone)]
pub struct ObjectCache {
    store: Arc<dyn DurableStore>,
    memory: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl ObjectCache {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            memory: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<VersionedValue<T>> {
        let bytes = self.raw_get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &VersionedValue<T>) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.raw_put(key, bytes).await,
            Err(err) => tracing::warn!(key, error = %err, "cache entry not serializable"),
        }
    }

    /// Storing an empty list is a clear, not an empty payload: a server
    /// response with zero entries must leave an explicit "no cache" signal
    /// rather than persist an empty collection.
    pub async fn put_list<T: Serialize>(&self, key: &str, values: &[T]) {
        if values.is_empty() {
            tracing::debug!(key, "empty list stored as clear");
            self.clear(key).await;
            return;
        }
        match serde_json::to_vec(values) {
            Ok(bytes) => self.raw_put(key, bytes).await,
            Err(err) => tracing::warn!(key, error = %err, "cache list not serializable"),
        }
    }

    /// Absent and empty are the same thing for list records: both read back
    /// as `None`.
    pub async fn get_list<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let bytes = self.raw_get(key).await?;
        let values: Vec<T> = match serde_json::from_slice(&bytes) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable cache list");
                return None;
            }
        };
        if values.is_empty() { None } else { Some(values) }
    }

    pub async fn clear(&self, key: &str) {
        self.memory.write().await.remove(key);
        if let Err(err) = self.store.remove(key).await {
            tracing::warn!(key, error = %err, "cache remove did not persist");
        }
    }

    async fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.memory.read().await.get(key).cloned() {
            return Some(bytes);
        }
        match self.store.get_bytes(key).await {
            Ok(Some(bytes)) => {
                self.memory
                    .write()
                    .await
                    .insert(key.to_string(), bytes.clone());
                Some(bytes)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    async fn raw_put(&self, key: &str, bytes: Vec<u8>) {
        self.memory
            .write()
            .await
            .insert(key.to_string(), bytes.clone());
        if let Err(err) = self.store.set_bytes(key, bytes).await {
            tracing::warn!(key, error = %err, "cache write did not persist");
        }
    }
}
