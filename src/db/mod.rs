//! Database layer for routed-dl
//!
//! SQLite persistence for the confidence registry and its companion fetch history.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`origins`]: Origin record reads, writes and aggregates
//! - [`history`]: Append-only fetch history and retention

use crate::error::Error;
use crate::types::{Category, HistoryEntry, OriginRecord};
use sqlx::{FromRow, sqlite::SqlitePool};

mod history;
mod migrations;
mod origins;

/// Origin record row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct OriginRow {
    /// Normalized origin key
    pub origin: String,
    /// Executable binary name
    pub executable: String,
    /// Confidence in [0.01, 0.99]
    pub confidence: f64,
    /// Observed successes
    pub success_count: i64,
    /// Observed failures
    pub failure_count: i64,
    /// Category label
    pub category: String,
    /// Unix timestamp of the last update
    pub last_tested: i64,
    /// Sensitive-content flag (0 = no, 1 = yes)
    pub is_sensitive: i32,
}

impl TryFrom<OriginRow> for OriginRecord {
    type Error = Error;

    fn try_from(row: OriginRow) -> std::result::Result<Self, Self::Error> {
        use chrono::{TimeZone, Utc};

        Ok(OriginRecord {
            executable: row.executable.parse()?,
            origin: row.origin,
            confidence: row.confidence,
            success_count: row.success_count.max(0) as u32,
            failure_count: row.failure_count.max(0) as u32,
            category: Category::from_db(&row.category),
            last_tested: Utc
                .timestamp_opt(row.last_tested, 0)
                .single()
                .unwrap_or_else(Utc::now),
            is_sensitive: row.is_sensitive != 0,
        })
    }
}

/// New fetch history entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    /// Origin key the fetch targeted
    pub origin: String,
    /// Short fingerprint of the full URL
    pub url_hash: Option<String>,
    /// Executable binary name
    pub executable: String,
    /// Whether the fetch succeeded
    pub success: bool,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
    /// Files promoted to the destination
    pub files_produced: u64,
    /// Failure message, if any
    pub error_message: Option<String>,
    /// Unix timestamp when the fetch finished
    pub recorded_at: i64,
}

/// Fetch history row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Origin key
    pub origin: String,
    /// Short fingerprint of the full URL
    pub url_hash: Option<String>,
    /// Executable binary name
    pub executable_used: String,
    /// Success flag (0 = failed, 1 = succeeded)
    pub success: i32,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
    /// Files promoted to the destination
    pub files_produced: i64,
    /// Failure message
    pub error_message: Option<String>,
    /// Unix timestamp when the fetch finished
    pub timestamp: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};
        use std::time::Duration;

        HistoryEntry {
            id: row.id,
            origin: row.origin,
            url_hash: row.url_hash,
            executable: row.executable_used,
            success: row.success != 0,
            duration: Duration::from_secs_f64(row.duration_secs.max(0.0)),
            files_produced: row.files_produced.max(0) as u64,
            error_message: row.error_message,
            recorded_at: Utc
                .timestamp_opt(row.timestamp, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Aggregate counters over the origins table
#[derive(Debug, Clone, Default, FromRow)]
pub struct OriginAggregates {
    /// Number of origin rows
    pub total_origins: i64,
    /// Mean confidence (None when the table is empty)
    pub average_confidence: Option<f64>,
    /// Sum of success counters
    pub total_successes: Option<i64>,
    /// Sum of failure counters
    pub total_failures: Option<i64>,
}

/// Database handle for routed-dl
pub struct Database {
    pool: SqlitePool,
}
