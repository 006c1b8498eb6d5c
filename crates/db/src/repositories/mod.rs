use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod blob;
pub mod memory;

pub use blob::SqlBlobStore;
pub use memory::InMemoryBlobStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("blob key already exists: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// One serialized audit record as persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub kind: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Durable key-value store for audit records. Keys are written once and never updated.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, blob: StoredBlob) -> Result<(), RepositoryError>;
    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, RepositoryError>;
    async fn count(&self, kind: Option<&str>) -> Result<u64, RepositoryError>;
    async fn ping(&self) -> Result<(), RepositoryError>;
}
