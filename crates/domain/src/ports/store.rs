use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(String),
}

/// On-device key-value persistence shared across process restarts.
/// Implementations must be atomic per key: a concurrent read sees either the
/// previous or the new payload, never a torn write.
pub trait DurableStore: Send + Sync {
    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), StoreError>>;
    fn get_bytes(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>>;
    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>>;
}
