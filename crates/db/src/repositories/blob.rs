use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{BlobStore, RepositoryError, StoredBlob};
use crate::DbPool;

pub struct SqlBlobStore {
    pool: DbPool,
}

impl SqlBlobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobStore for SqlBlobStore {
    async fn put(&self, blob: StoredBlob) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO telemetry_blob (key, kind, body, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&blob.key)
        .bind(&blob.kind)
        .bind(&blob.body)
        .bind(blob.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(blob.key))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT key, kind, body, created_at
            FROM telemetry_blob
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(blob_from_row).transpose()
    }

    async fn count(&self, kind: Option<&str>) -> Result<u64, RepositoryError> {
        let count: i64 = match kind {
            Some(kind) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM telemetry_blob WHERE kind = ?")
                    .bind(kind)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM telemetry_blob")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        u64::try_from(count).map_err(|_| RepositoryError::Decode(format!("negative count {count}")))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1 FROM telemetry_blob LIMIT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

fn blob_from_row(row: SqliteRow) -> Result<StoredBlob, RepositoryError> {
    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|error| RepositoryError::Decode(format!("created_at `{created_at}`: {error}")))?
        .with_timezone(&Utc);

    Ok(StoredBlob {
        key: row.try_get("key")?,
        kind: row.try_get("kind")?,
        body: row.try_get("body")?,
        created_at,
    })
}
