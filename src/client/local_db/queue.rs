//! # Pending Request Rows
//!
//! Row-level access to the `pending_requests` table and the `sync_metadata`
//! key/value table. Values arrive here already serialized; decoding rows into
//! domain types happens in `client::offline::queue`.
//!
//! Every mutation is a single SQL statement, so each one is atomic on its own.

use crate::client::local_db::{LocalDatabase, Result};

/// Raw row of `pending_requests`
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingRow {
    pub id: i64,
    pub url: String,
    pub method: String,
    /// JSON object of header name to value
    pub headers: String,
    pub body_type: Option<String>,
    /// JSON of the tagged stored body
    pub body: Option<String>,
    pub created_at: i64,
    pub retry_count: i64,
}

/// Column values for a new `pending_requests` row
#[derive(Debug, Clone)]
pub struct NewPendingRow<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub headers: &'a str,
    pub body_type: Option<&'a str>,
    pub body: Option<&'a str>,
    pub created_at: i64,
}

const SELECT_PENDING: &str = "SELECT id, url, method, headers, body_type, body, created_at, retry_count
     FROM pending_requests";

impl LocalDatabase {
    /// Append a row and return its assigned identifier
    pub async fn insert_pending(&self, row: NewPendingRow<'_>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO pending_requests (url, method, headers, body_type, body, created_at, retry_count)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(row.url)
        .bind(row.method)
        .bind(row.headers)
        .bind(row.body_type)
        .bind(row.body)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All rows in insertion order
    pub async fn fetch_pending(&self) -> Result<Vec<PendingRow>> {
        let sql = format!("{} ORDER BY id ASC", SELECT_PENDING);
        sqlx::query_as::<_, PendingRow>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    /// Rows targeting `url`, in insertion order
    pub async fn fetch_pending_by_url(&self, url: &str) -> Result<Vec<PendingRow>> {
        let sql = format!("{} WHERE url = ? ORDER BY id ASC", SELECT_PENDING);
        sqlx::query_as::<_, PendingRow>(&sql)
            .bind(url)
            .fetch_all(&self.pool)
            .await
    }

    /// Delete a row; returns whether a row was removed
    pub async fn delete_pending(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count queued rows without loading them
    pub async fn count_pending(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Bump the retry counter of a row after a failed replay
    pub async fn increment_retry(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE pending_requests SET retry_count = retry_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Get last sync timestamp
    pub async fn get_last_sync_time(&self) -> Result<Option<String>> {
        self.get_sync_metadata("last_sync_time").await
    }

    /// Set last sync timestamp
    pub async fn set_last_sync_time(&self) -> Result<()> {
        self.set_sync_metadata("last_sync_time", &chrono::Utc::now().to_rfc3339())
            .await
    }
}
