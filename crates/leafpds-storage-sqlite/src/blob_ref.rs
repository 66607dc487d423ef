use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use leafpds_core::{BlobRefStore, PdsError, PdsResult};

#[derive(Clone)]
pub struct SqliteBlobRefStore {
    pool: SqlitePool,
}

impl SqliteBlobRefStore {
    pub async fn connect(url: &str) -> PdsResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl BlobRefStore for SqliteBlobRefStore {
    async fn register_blob(&self, did: &str, blob_cid: &str, mime_type: &str, size: i64) -> PdsResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO blob (did, cid, mime_type, size) VALUES (?, ?, ?, ?)",
        )
        .bind(did)
        .bind(blob_cid)
        .bind(mime_type)
        .bind(size)
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn add_ref(&self, did: &str, blob_cid: &str, record_uri: &str) -> PdsResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO blob_ref (did, blob_cid, record_uri) VALUES (?, ?, ?)",
        )
        .bind(did)
        .bind(blob_cid)
        .bind(record_uri)
        .execute(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn remove_ref(&self, did: &str, blob_cid: &str, record_uri: &str) -> PdsResult<()> {
        sqlx::query("DELETE FROM blob_ref WHERE did = ? AND blob_cid = ? AND record_uri = ?")
            .bind(did)
            .bind(blob_cid)
            .bind(record_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn remove_refs_for_record(&self, did: &str, record_uri: &str) -> PdsResult<()> {
        sqlx::query("DELETE FROM blob_ref WHERE did = ? AND record_uri = ?")
            .bind(did)
            .bind(record_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn ref_count(&self, did: &str, blob_cid: &str) -> PdsResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM blob_ref WHERE did = ? AND blob_cid = ?",
        )
        .bind(did)
        .bind(blob_cid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        let count: i64 = row.try_get("count").map_err(|e| PdsError::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    async fn list_orphans(&self, did: &str) -> PdsResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT b.cid as cid FROM blob b \
             LEFT JOIN blob_ref r ON r.did = b.did AND r.blob_cid = b.cid \
             WHERE b.did = ? AND r.blob_cid IS NULL",
        )
        .bind(did)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PdsError::Storage(e.to_string()))?;

        rows.iter()
            .map(|r| r.try_get("cid").map_err(|e| PdsError::Storage(e.to_string())))
            .collect()
    }
}
