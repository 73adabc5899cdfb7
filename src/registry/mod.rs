//! Confidence registry
//!
//! Learns which executable works for which origin. Every fetch outcome nudges
//! the origin's confidence: a small fixed step up on success, a five times
//! larger step down on failure, clamped to `[0.01, 0.99]`.
//!
//! The registry is fail-open. Storage errors never reach the fetch path:
//! [`ConfidenceRegistry::lookup`] reports "no record" and
//! [`ConfidenceRegistry::record_outcome`] logs and carries on, so routing falls
//! back to the static tables during an outage.

use crate::db::{Database, NewHistoryEntry};
use crate::types::{Category, ExecutableKind, HistoryEntry, OriginRecord, RegistryStats};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod seeds;

pub use seeds::{KNOWN_ORIGINS, SEED_SUCCESS_COUNT, SeedRecord};

/// Confidence added per success
pub const SUCCESS_STEP: f64 = 0.01;
/// Confidence removed per failure
pub const FAILURE_STEP: f64 = 0.05;
/// Lower confidence bound
pub const MIN_CONFIDENCE: f64 = 0.01;
/// Upper confidence bound
pub const MAX_CONFIDENCE: f64 = 0.99;
/// Confidence of a record created by a success
pub const INITIAL_SUCCESS_CONFIDENCE: f64 = 0.8;
/// Confidence of a record created by a failure
pub const INITIAL_FAILURE_CONFIDENCE: f64 = 0.2;
/// A success with another executable replaces records below this confidence
pub const REPLACE_BELOW_CONFIDENCE: f64 = 0.8;
/// Default threshold for the supported-origins report
pub const REPORT_THRESHOLD: f64 = 0.5;

/// Apply one outcome to a confidence value
///
/// Results are rounded to six decimals so repeated nudges don't accumulate
/// floating point drift.
pub fn nudge(confidence: f64, success: bool) -> f64 {
    let next = if success {
        confidence + SUCCESS_STEP
    } else {
        confidence - FAILURE_STEP
    };
    round6(next.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE))
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Short fingerprint of a URL stored in history instead of the URL itself
pub fn url_fingerprint(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..16].to_string()
}

/// Everything known about a finished fetch, for history and learning
#[derive(Clone, Debug)]
pub struct FetchReport<'a> {
    /// Origin key
    pub origin: &'a str,
    /// Full URL (only its fingerprint is stored)
    pub url: &'a str,
    /// Executable that ran
    pub executable: ExecutableKind,
    /// Whether the fetch succeeded
    pub success: bool,
    /// Wall-clock duration
    pub duration: Duration,
    /// Files promoted to the destination
    pub files_produced: u64,
    /// Failure message, if any
    pub error_message: Option<&'a str>,
}

/// One entry of the exported supported-origins report
#[derive(Clone, Debug, Serialize)]
pub struct SupportedOrigin {
    /// Origin key
    pub origin: String,
    /// Preferred executable
    pub executable: ExecutableKind,
    /// Current confidence
    pub confidence: f64,
    /// Content category
    pub category: Category,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    export_date: String,
    version: &'static str,
    total_sites: usize,
    sites: &'a [SupportedOrigin],
}

/// Repository of learned origin → executable preferences
///
/// Passed by `Arc` to everything that routes or reports outcomes.
pub struct ConfidenceRegistry {
    db: Arc<Database>,
    /// Serializes read-modify-write cycles so concurrent outcomes for the same
    /// origin are never lost
    write_lock: Mutex<()>,
}

impl ConfidenceRegistry {
    /// Wrap an open database
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Exact-match lookup of an origin key
    ///
    /// Storage failures and unreadable rows are logged and reported as `None`.
    pub async fn lookup(&self, origin: &str) -> Option<OriginRecord> {
        match self.db.get_origin(origin).await {
            Ok(Some(row)) => match OriginRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(origin, error = %e, "ignoring unreadable origin record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(origin, error = %e, "registry lookup failed, continuing without it");
                None
            }
        }
    }

    /// Learn from one outcome
    ///
    /// - Same executable as the stored record: bump the matching counter and nudge confidence.
    /// - No record: create one at 0.8 (success) or 0.2 (failure).
    /// - Different executable: a success replaces a record below
    ///   [`REPLACE_BELOW_CONFIDENCE`] with a fresh record for the new
    ///   executable; anything else leaves the record alone.
    ///
    /// The replacement goes beyond plain insert-or-ignore learning, under
    /// which the first executable recorded for an origin keeps its routing
    /// no matter what other executables achieve there.
    ///
    /// Returns the record as stored afterwards, or `None` if storage failed
    /// (the failure is logged, never propagated).
    pub async fn record_outcome(
        &self,
        origin: &str,
        executable: ExecutableKind,
        success: bool,
    ) -> Option<OriginRecord> {
        let _guard = self.write_lock.lock().await;

        match self.apply_outcome(origin, executable, success).await {
            Ok(record) => {
                tracing::debug!(
                    origin,
                    executable = %executable,
                    success,
                    confidence = record.confidence,
                    "recorded fetch outcome"
                );
                Some(record)
            }
            Err(e) => {
                tracing::error!(
                    origin,
                    executable = %executable,
                    success,
                    error = %e,
                    "failed to record fetch outcome"
                );
                None
            }
        }
    }

    async fn apply_outcome(
        &self,
        origin: &str,
        executable: ExecutableKind,
        success: bool,
    ) -> Result<OriginRecord> {
        let existing = match self.db.get_origin(origin).await? {
            Some(row) => match OriginRecord::try_from(row) {
                Ok(record) => Some(record),
                // An unreadable executable is treated like a missing record
                Err(Error::UnsupportedExecutable(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let now = Utc::now();
        let record = match existing {
            Some(mut record) if record.executable == executable => {
                if success {
                    record.success_count = record.success_count.saturating_add(1);
                } else {
                    record.failure_count = record.failure_count.saturating_add(1);
                }
                record.confidence = nudge(record.confidence, success);
                record.last_tested = now;
                record
            }
            Some(record) if !success || record.confidence >= REPLACE_BELOW_CONFIDENCE => {
                tracing::debug!(
                    origin,
                    stored = %record.executable,
                    observed = %executable,
                    "keeping stored executable"
                );
                return Ok(record);
            }
            Some(record) => OriginRecord {
                origin: origin.to_string(),
                executable,
                confidence: INITIAL_SUCCESS_CONFIDENCE,
                success_count: 1,
                failure_count: 0,
                category: record.category,
                last_tested: now,
                is_sensitive: record.is_sensitive,
            },
            None => OriginRecord {
                origin: origin.to_string(),
                executable,
                confidence: if success {
                    INITIAL_SUCCESS_CONFIDENCE
                } else {
                    INITIAL_FAILURE_CONFIDENCE
                },
                success_count: u32::from(success),
                failure_count: u32::from(!success),
                category: Category::Unknown,
                last_tested: now,
                is_sensitive: false,
            },
        };

        self.db.upsert_origin(&record).await?;
        Ok(record)
    }

    /// Append a finished fetch to history and learn from it
    ///
    /// Both steps are fail-open.
    pub async fn record_fetch(&self, report: &FetchReport<'_>) -> Option<OriginRecord> {
        let entry = NewHistoryEntry {
            origin: report.origin.to_string(),
            url_hash: Some(url_fingerprint(report.url)),
            executable: report.executable.binary_name().to_string(),
            success: report.success,
            duration_secs: report.duration.as_secs_f64(),
            files_produced: report.files_produced,
            error_message: report.error_message.map(str::to_string),
            recorded_at: Utc::now().timestamp(),
        };
        if let Err(e) = self.db.insert_history(&entry).await {
            tracing::warn!(origin = report.origin, error = %e, "failed to append fetch history");
        }

        self.record_outcome(report.origin, report.executable, report.success)
            .await
    }

    /// Insert records for keys not yet present (insert-or-ignore)
    ///
    /// Returns the number of records inserted.
    pub async fn seed(&self, records: &[SeedRecord]) -> Result<usize> {
        self.apply_seeds(records, false).await
    }

    /// Re-apply records, overwriting routing for keys already present
    ///
    /// Learned counters are kept. Returns the number of records written.
    pub async fn refresh_seeds(&self, records: &[SeedRecord]) -> Result<usize> {
        self.apply_seeds(records, true).await
    }

    async fn apply_seeds(&self, records: &[SeedRecord], overwrite: bool) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut written = 0;

        for seed in records {
            let record = OriginRecord {
                origin: seed.origin.to_string(),
                executable: seed.executable,
                confidence: seed.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
                success_count: SEED_SUCCESS_COUNT,
                failure_count: 0,
                category: seed.category,
                last_tested: now,
                is_sensitive: seed.is_sensitive,
            };
            if self.db.seed_origin(&record, overwrite).await? {
                written += 1;
            }
        }

        tracing::info!(written, total = records.len(), overwrite, "applied origin seeds");
        Ok(written)
    }

    /// Records with confidence above `threshold`, highest first
    pub async fn all_with_confidence_above(&self, threshold: f64) -> Result<Vec<OriginRecord>> {
        let rows = self.db.list_origins_above(threshold).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match OriginRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable origin record"),
            }
        }
        Ok(records)
    }

    /// Aggregate statistics over all origins
    pub async fn stats(&self) -> Result<RegistryStats> {
        let aggregates = self.db.origin_aggregates().await?;
        Ok(RegistryStats {
            total_origins: aggregates.total_origins.max(0) as u64,
            average_confidence: aggregates.average_confidence.map(round6).unwrap_or(0.0),
            total_successes: aggregates.total_successes.unwrap_or(0).max(0) as u64,
            total_failures: aggregates.total_failures.unwrap_or(0).max(0) as u64,
        })
    }

    /// Fetch history, most recent first
    pub async fn history(
        &self,
        origin: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.db.query_history(origin, limit, offset).await
    }

    /// Delete history older than `days_to_keep` days
    ///
    /// Returns the number of entries deleted.
    pub async fn cleanup_history(&self, days_to_keep: u32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days_to_keep));
        let deleted = self.db.delete_history_before(cutoff.timestamp()).await?;
        if deleted > 0 {
            tracing::info!(deleted, days_to_keep, "removed old fetch history");
        }
        Ok(deleted)
    }

    /// Supported-origins report (confidence above [`REPORT_THRESHOLD`])
    pub async fn supported_origins(&self) -> Result<Vec<SupportedOrigin>> {
        Ok(self
            .all_with_confidence_above(REPORT_THRESHOLD)
            .await?
            .into_iter()
            .map(|r| SupportedOrigin {
                origin: r.origin,
                executable: r.executable,
                confidence: r.confidence,
                category: r.category,
            })
            .collect())
    }

    /// Write the supported-origins report to a JSON file
    ///
    /// Returns the number of origins exported.
    pub async fn export_report(&self, path: &Path) -> Result<usize> {
        let sites = self.supported_origins().await?;
        let document = ExportDocument {
            export_date: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            total_sites: sites.len(),
            sites: &sites,
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;

        tracing::info!(path = %path.display(), total = sites.len(), "exported supported origins");
        Ok(sites.len())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
