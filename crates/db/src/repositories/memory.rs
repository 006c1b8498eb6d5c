use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{BlobStore, RepositoryError, StoredBlob};

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored blobs ordered by key.
    pub async fn snapshot(&self) -> Vec<StoredBlob> {
        let blobs = self.blobs.read().await;
        let mut all: Vec<StoredBlob> = blobs.values().cloned().collect();
        all.sort_by(|left, right| left.key.cmp(&right.key));
        all
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, blob: StoredBlob) -> Result<(), RepositoryError> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(&blob.key) {
            return Err(RepositoryError::Conflict(blob.key));
        }
        blobs.insert(blob.key.clone(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, RepositoryError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).cloned())
    }

    async fn count(&self, kind: Option<&str>) -> Result<u64, RepositoryError> {
        let blobs = self.blobs.read().await;
        let count = blobs.values().filter(|blob| kind.map_or(true, |kind| blob.kind == kind)).count();
        Ok(count as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
