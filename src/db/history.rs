//! Fetch history operations.

use crate::types::HistoryEntry;
use crate::{Error, Result};

use super::{Database, HistoryRow, NewHistoryEntry};

impl Database {
    /// Append a fetch attempt to history
    pub async fn insert_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO fetch_history (
                origin, url_hash, executable_used, success, duration_secs,
                files_produced, error_message, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.origin)
        .bind(&entry.url_hash)
        .bind(&entry.executable)
        .bind(i32::from(entry.success))
        .bind(entry.duration_secs)
        .bind(entry.files_produced as i64)
        .bind(&entry.error_message)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Query history with pagination and optional origin filter
    ///
    /// Returns entries ordered by time (most recent first).
    pub async fn query_history(
        &self,
        origin_filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let query = if let Some(origin) = origin_filter {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, origin, url_hash, executable_used, success, duration_secs,
                       files_produced, error_message, timestamp
                FROM fetch_history
                WHERE origin = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(origin)
            .bind(limit as i64)
            .bind(offset as i64)
        } else {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, origin, url_hash, executable_used, success, duration_secs,
                       files_produced, error_message, timestamp
                FROM fetch_history
                ORDER BY timestamp DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit as i64)
            .bind(offset as i64)
        };

        let rows = query.fetch_all(&self.pool).await.map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count history entries (optionally filtered by origin)
    pub async fn count_history(&self, origin_filter: Option<&str>) -> Result<i64> {
        let count = if let Some(origin) = origin_filter {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM fetch_history WHERE origin = ?")
                .bind(origin)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        } else {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM fetch_history")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        };

        Ok(count)
    }

    /// Delete history entries older than the specified timestamp
    ///
    /// Returns the number of records deleted.
    pub async fn delete_history_before(&self, before_timestamp: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fetch_history WHERE timestamp < ?")
            .bind(before_timestamp)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
