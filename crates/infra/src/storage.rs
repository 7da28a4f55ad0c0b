use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use langgan_domain::ports::BoxFuture;
use langgan_domain::ports::store::{DurableStore, StoreError};

/// Volatile store for hosts without a writable data directory. Contents do
/// not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl DurableStore for MemoryStore {
    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.inner
                .lock()
                .expect("memory store lock")
                .insert(key, bytes);
            Ok(())
        })
    }

    fn get_bytes(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .inner
                .lock()
                .expect("memory store lock")
                .get(&key)
                .cloned())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.inner.lock().expect("memory store lock").remove(&key);
            Ok(())
        })
    }
}

/// One file per key under a dedicated directory. Writes go through a
/// temporary file and a rename so a crash never leaves a half-written record
/// behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys may contain characters that are not filename-safe; the file name
    /// is the key's digest instead.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(hex::encode(hasher.finalize()))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Io("store path has no parent directory".to_string()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|err| StoreError::Io(err.to_string()))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|err| StoreError::Io(err.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|err| StoreError::Io(err.to_string()))?;
    Ok(())
}

impl DurableStore for FileStore {
    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move { write_atomic(&path, &bytes).await })
    }

    fn get_bytes(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(StoreError::Io(err.to_string())),
            }
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(StoreError::Io(err.to_string())),
            }
        })
    }
}
