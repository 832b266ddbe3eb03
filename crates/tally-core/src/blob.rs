//! Blob store capability for oversized observations
//!
//! Observations larger than the configured threshold are offloaded to an
//! injected put/get store; the conversation keeps only an opaque reference id,
//! never a filesystem path.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Opaque reference to an offloaded blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef(String);

impl BlobRef {
    /// Generate a fresh reference id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The raw reference id
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

/// Injected put/get blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `id`
    async fn put(&self, id: &BlobRef, bytes: Vec<u8>) -> CoreResult<()>;

    /// Fetch the bytes stored under `id`
    async fn get(&self, id: &BlobRef) -> CoreResult<Option<Vec<u8>>>;
}

/// In-memory blob store
///
/// Intended for tests and single-process runs; production deployments inject
/// their own backend.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    max_bytes: Option<usize>,
}

impl MemoryBlobStore {
    /// Create an unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes past a total byte budget
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_bytes: Some(max_bytes),
        }
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: &BlobRef, bytes: Vec<u8>) -> CoreResult<()> {
        let mut entries = self.entries.lock();
        if let Some(max) = self.max_bytes {
            let used: usize = entries.values().map(Vec::len).sum();
            if used + bytes.len() > max {
                return Err(CoreError::blob(format!(
                    "store full: {} + {} bytes exceeds {}",
                    used,
                    bytes.len(),
                    max
                )));
            }
        }
        entries.insert(id.id().to_string(), bytes);
        Ok(())
    }

    async fn get(&self, id: &BlobRef) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(id.id()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBlobStore::new();
        let id = BlobRef::generate();

        store.put(&id, b"payload".to_vec()).await.unwrap();

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryBlobStore::new();
        let fetched = store.get(&BlobRef::generate()).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store = MemoryBlobStore::with_capacity(8);
        let id = BlobRef::generate();

        store.put(&id, vec![0u8; 8]).await.unwrap();

        let overflow = store.put(&BlobRef::generate(), vec![0u8; 1]).await;
        assert!(overflow.is_err());
    }

    #[test]
    fn test_blob_ref_display() {
        let id = BlobRef::generate();
        assert!(id.to_string().starts_with("blob:"));
    }
}
