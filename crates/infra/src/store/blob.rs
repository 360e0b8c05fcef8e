use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::error::StoreError;

/// Blob storage collaborator (signatures, receipts).
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` at `path`; returns the stored path.
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Time-limited URL for reading `path`.
    fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StoreError>;
}

/// In-memory blob storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_next_upload: Mutex<Option<StoreError>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upload(&self, error: StoreError) {
        if let Ok(mut slot) = self.fail_next_upload.lock() {
            *slot = Some(error);
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().ok()?.get(path).cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }
}

impl BlobStorage for InMemoryBlobStorage {
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        if let Some(err) = self
            .fail_next_upload
            .lock()
            .map_err(|_| StoreError::backend("lock poisoned"))?
            .take()
        {
            return Err(err);
        }
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(path.to_string())
    }

    fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StoreError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))?;
        if !blobs.contains_key(path) {
            return Err(StoreError::NotFound {
                kind: "blob",
                id: path.to_string(),
            });
        }
        Ok(format!("memory://{path}?expires_in={}", ttl.as_secs()))
    }
}
