//! Origin record operations.

use crate::types::OriginRecord;
use crate::{Error, Result};

use super::{Database, OriginAggregates, OriginRow};

impl Database {
    /// Get the record for an origin key (exact match)
    pub async fn get_origin(&self, origin: &str) -> Result<Option<OriginRow>> {
        let row = sqlx::query_as::<_, OriginRow>(
            r#"
            SELECT origin, executable, confidence, success_count, failure_count,
                   category, last_tested, is_sensitive
            FROM origins
            WHERE origin = ?
            "#,
        )
        .bind(origin)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Insert or fully replace the record for `record.origin`
    ///
    /// Counters, executable and confidence are written exactly as given.
    pub async fn upsert_origin(&self, record: &OriginRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO origins (
                origin, executable, confidence, success_count, failure_count,
                category, last_tested, is_sensitive
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(origin) DO UPDATE SET
                executable = excluded.executable,
                confidence = excluded.confidence,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                category = excluded.category,
                last_tested = excluded.last_tested,
                is_sensitive = excluded.is_sensitive
            "#,
        )
        .bind(&record.origin)
        .bind(record.executable.binary_name())
        .bind(record.confidence)
        .bind(i64::from(record.success_count))
        .bind(i64::from(record.failure_count))
        .bind(record.category.as_str())
        .bind(record.last_tested.timestamp())
        .bind(i32::from(record.is_sensitive))
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Insert a seed record
    ///
    /// With `overwrite == false` an existing record is left untouched
    /// (insert-or-ignore). With `overwrite == true` the seed's executable,
    /// confidence, category and sensitivity replace the stored ones while the
    /// learned counters are kept.
    ///
    /// Returns true if a row was inserted or changed.
    pub async fn seed_origin(&self, record: &OriginRecord, overwrite: bool) -> Result<bool> {
        let sql = if overwrite {
            r#"
            INSERT INTO origins (
                origin, executable, confidence, success_count, failure_count,
                category, last_tested, is_sensitive
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(origin) DO UPDATE SET
                executable = excluded.executable,
                confidence = excluded.confidence,
                category = excluded.category,
                last_tested = excluded.last_tested,
                is_sensitive = excluded.is_sensitive
            "#
        } else {
            r#"
            INSERT OR IGNORE INTO origins (
                origin, executable, confidence, success_count, failure_count,
                category, last_tested, is_sensitive
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        };

        let result = sqlx::query(sql)
            .bind(&record.origin)
            .bind(record.executable.binary_name())
            .bind(record.confidence)
            .bind(i64::from(record.success_count))
            .bind(i64::from(record.failure_count))
            .bind(record.category.as_str())
            .bind(record.last_tested.timestamp())
            .bind(i32::from(record.is_sensitive))
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// List records with confidence strictly above `threshold`, highest first
    ///
    /// Ties are broken by origin key so the order is stable.
    pub async fn list_origins_above(&self, threshold: f64) -> Result<Vec<OriginRow>> {
        let rows = sqlx::query_as::<_, OriginRow>(
            r#"
            SELECT origin, executable, confidence, success_count, failure_count,
                   category, last_tested, is_sensitive
            FROM origins
            WHERE confidence > ?
            ORDER BY confidence DESC, origin ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows)
    }

    /// Aggregate counters over all origins
    pub async fn origin_aggregates(&self) -> Result<OriginAggregates> {
        let aggregates = sqlx::query_as::<_, OriginAggregates>(
            r#"
            SELECT COUNT(*) AS total_origins,
                   AVG(confidence) AS average_confidence,
                   SUM(success_count) AS total_successes,
                   SUM(failure_count) AS total_failures
            FROM origins
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(aggregates)
    }
}
