//! Stream repository — append-only message log read by downstream consumers

use crate::{DbError, DbResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A single entry of a named stream
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreamEntryRecord {
    pub id: i64,
    pub stream: String,
    pub payload: String,
    pub producer: Option<String>,
    pub created_at: Option<i64>,
}

impl StreamEntryRecord {
    /// Decode the stored JSON payload
    pub fn payload_json(&self) -> DbResult<serde_json::Value> {
        serde_json::from_str(&self.payload)
            .map_err(|e| DbError::Query(format!("entry {} has invalid payload: {e}", self.id)))
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Per-stream entry counts
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreamStats {
    pub stream: String,
    pub entries: i64,
    pub last_id: i64,
}

/// Repository for stream entries
pub struct StreamRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StreamRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a payload to `stream`, returning the new entry id
    pub async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
        producer: Option<&str>,
    ) -> DbResult<i64> {
        let body = serde_json::to_string(payload)
            .map_err(|e| DbError::Query(format!("payload encoding failed: {e}")))?;

        let result =
            sqlx::query("INSERT INTO stream_entries (stream, payload, producer) VALUES (?, ?, ?)")
                .bind(stream)
                .bind(&body)
                .bind(producer)
                .execute(self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    /// Entries of `stream` with id greater than `after_id`, oldest first
    pub async fn read_after(
        &self,
        stream: &str,
        after_id: i64,
        limit: i64,
    ) -> DbResult<Vec<StreamEntryRecord>> {
        let records = sqlx::query_as::<_, StreamEntryRecord>(
            r#"
            SELECT id, stream, payload, producer, created_at
            FROM stream_entries
            WHERE stream = ? AND id > ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(stream)
        .bind(after_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// The newest `limit` entries of `stream`, returned oldest first
    pub async fn latest(&self, stream: &str, limit: i64) -> DbResult<Vec<StreamEntryRecord>> {
        let mut records = sqlx::query_as::<_, StreamEntryRecord>(
            r#"
            SELECT id, stream, payload, producer, created_at
            FROM stream_entries
            WHERE stream = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(stream)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        records.reverse();
        Ok(records)
    }

    pub async fn count(&self, stream: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stream_entries WHERE stream = ?")
            .bind(stream)
            .fetch_one(self.pool)
            .await?;

        Ok(row.0)
    }

    /// Entry counts for every stream that has at least one entry
    pub async fn stats(&self) -> DbResult<Vec<StreamStats>> {
        let stats = sqlx::query_as::<_, StreamStats>(
            r#"
            SELECT stream, COUNT(*) AS entries, MAX(id) AS last_id
            FROM stream_entries
            GROUP BY stream
            ORDER BY stream
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(stats)
    }
}
