pub mod connection;
pub mod migrations;
pub mod recorder;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use recorder::{RecordError, TelemetryRecorder};
pub use repositories::{BlobStore, InMemoryBlobStore, RepositoryError, SqlBlobStore, StoredBlob};
