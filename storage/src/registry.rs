//! Metadata registry (C2), backed by SQLite.
//!
//! `transition` is the sole mutation point for `index_state`: every caller
//! performs a compare-and-set (`UPDATE ... WHERE gmid = ? AND index_state =
//! ?`) and inspects the affected-row count, so two workers racing on the
//! same GMID never both believe they won (§4.2, §5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::StorageError;
use mk_core::traits::MetadataRegistry as MetadataRegistryTrait;
use mk_core::{Gmid, IndexState, MediaRecord, MediaType};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub struct SqliteRegistry {
    pool: Pool<Sqlite>
}

impl SqliteRegistry {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = Pool::connect(url)
            .await
            .map_err(|e| StorageError::Query { reason: e.to_string() })?;
        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS media_records (
                gmid TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                stored_path TEXT NOT NULL,
                thumbnail_path TEXT NOT NULL,
                media_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                width INTEGER,
                height INTEGER,
                duration_ms INTEGER,
                upload_time TEXT NOT NULL,
                description TEXT NOT NULL,
                index_state TEXT NOT NULL,
                index_attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration { reason: e.to_string() })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_media_records_state ON media_records(index_state)"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration { reason: e.to_string() })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_media_records_upload_time ON media_records(upload_time \
             DESC)"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration { reason: e.to_string() })?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MediaRecord, StorageError> {
        let gmid_str: String = row.try_get("gmid").map_err(query_err)?;
        let media_type_str: String = row.try_get("media_type").map_err(query_err)?;
        let upload_time_str: String = row.try_get("upload_time").map_err(query_err)?;
        let index_state_str: String = row.try_get("index_state").map_err(query_err)?;

        Ok(MediaRecord {
            gmid: Gmid::from_str(&gmid_str)
                .map_err(|e| StorageError::Query { reason: e.to_string() })?,
            original_name: row.try_get("original_name").map_err(query_err)?,
            stored_path: row.try_get("stored_path").map_err(query_err)?,
            thumbnail_path: row.try_get("thumbnail_path").map_err(query_err)?,
            media_type: MediaType::from_str(&media_type_str)
                .map_err(|reason| StorageError::Query { reason })?,
            size_bytes: row.try_get::<i64, _>("size_bytes").map_err(query_err)? as u64,
            width: row.try_get::<Option<i64>, _>("width").map_err(query_err)?.map(|v| v as u32),
            height: row.try_get::<Option<i64>, _>("height").map_err(query_err)?.map(|v| v as u32),
            duration_ms: row
                .try_get::<Option<i64>, _>("duration_ms")
                .map_err(query_err)?
                .map(|v| v as u64),
            upload_time: DateTime::<Utc>::from_str(&upload_time_str)
                .map_err(|e| StorageError::Query { reason: e.to_string() })?,
            description: row.try_get("description").map_err(query_err)?,
            index_state: IndexState::from_str(&index_state_str)
                .map_err(|reason| StorageError::Query { reason })?,
            index_attempts: row.try_get::<i64, _>("index_attempts").map_err(query_err)? as u32,
            last_error: row.try_get("last_error").map_err(query_err)?
        })
    }
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query { reason: e.to_string() }
}

#[async_trait]
impl MetadataRegistryTrait for SqliteRegistry {
    type Error = StorageError;

    async fn put(&self, record: MediaRecord) -> Result<(), Self::Error> {
        sqlx::query(
            "INSERT INTO media_records (gmid, original_name, stored_path, thumbnail_path, \
             media_type, size_bytes, width, height, duration_ms, upload_time, description, \
             index_state, index_attempts, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(gmid) DO UPDATE SET original_name = excluded.original_name"
        )
        .bind(record.gmid.as_str())
        .bind(&record.original_name)
        .bind(&record.stored_path)
        .bind(&record.thumbnail_path)
        .bind(record.media_type.to_string())
        .bind(record.size_bytes as i64)
        .bind(record.width.map(i64::from))
        .bind(record.height.map(i64::from))
        .bind(record.duration_ms.map(|v| v as i64))
        .bind(record.upload_time.to_rfc3339())
        .bind(&record.description)
        .bind(record.index_state.to_string())
        .bind(i64::from(record.index_attempts))
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn get(&self, gmid: &Gmid) -> Result<Option<MediaRecord>, Self::Error> {
        let row = sqlx::query("SELECT * FROM media_records WHERE gmid = ?")
            .bind(gmid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn find_by_path(&self, stored_path: &str) -> Result<Option<MediaRecord>, Self::Error> {
        let row = sqlx::query("SELECT * FROM media_records WHERE stored_path = ?")
            .bind(stored_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(
        &self,
        limit: usize,
        cursor: Option<String>,
        media_type: Option<MediaType>
    ) -> Result<(Vec<MediaRecord>, Option<String>), Self::Error> {
        let offset: i64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let rows = match media_type {
            Some(media_type) => {
                sqlx::query(
                    "SELECT * FROM media_records WHERE media_type = ? ORDER BY upload_time DESC \
                     LIMIT ? OFFSET ?"
                )
                .bind(media_type.to_string())
                .bind(limit as i64 + 1)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM media_records ORDER BY upload_time DESC LIMIT ? OFFSET ?")
                    .bind(limit as i64 + 1)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(query_err)?;

        let mut records = rows.iter().map(Self::row_to_record).collect::<Result<Vec<_>, _>>()?;
        let next_cursor = if records.len() > limit {
            records.truncate(limit);
            Some((offset + limit as i64).to_string())
        } else {
            None
        };
        Ok((records, next_cursor))
    }

    async fn update_description(
        &self,
        gmid: &Gmid,
        description: String
    ) -> Result<(), Self::Error> {
        let result = sqlx::query("UPDATE media_records SET description = ? WHERE gmid = ?")
            .bind(&description)
            .bind(gmid.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { gmid: gmid.to_string() });
        }
        Ok(())
    }

    async fn transition(
        &self,
        gmid: &Gmid,
        from: IndexState,
        to: IndexState,
        error: Option<String>
    ) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            "UPDATE media_records SET index_state = ?, last_error = ?
             WHERE gmid = ? AND index_state = ?"
        )
        .bind(to.to_string())
        .bind(&error)
        .bind(gmid.as_str())
        .bind(from.to_string())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_state(
        &self,
        state: IndexState,
        limit: usize
    ) -> Result<Vec<MediaRecord>, Self::Error> {
        let rows = sqlx::query("SELECT * FROM media_records WHERE index_state = ? LIMIT ?")
            .bind(state.to_string())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, gmid: &Gmid) -> Result<(), Self::Error> {
        sqlx::query("DELETE FROM media_records WHERE gmid = ?")
            .bind(gmid.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

/// Increments `index_attempts` independent of any state change; used by the
/// pipeline before a retry CAS back to `thumbnail_ready`.
impl SqliteRegistry {
    pub async fn increment_attempts(&self, gmid: &Gmid) -> Result<u32, StorageError> {
        sqlx::query("UPDATE media_records SET index_attempts = index_attempts + 1 WHERE gmid = ?")
            .bind(gmid.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        let row = sqlx::query("SELECT index_attempts FROM media_records WHERE gmid = ?")
            .bind(gmid.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(row.try_get::<i64, _>("index_attempts").map_err(query_err)? as u32)
    }
}
