//! Staging gate
//!
//! A fetch writes into a per-ticket scratch directory under the staging root.
//! Only when the fetch succeeds are the regular files directly inside scratch
//! moved into the destination; a failed fetch discards scratch.
//!
//! Promotion never overwrites. A name collision fails that one file and the
//! rest of the batch continues. Whatever was not promoted is deleted with the
//! scratch directory. A file that keeps failing to move or delete with a
//! permission error after retries is relocated into the quarantine directory
//! and reported as a warning.
//!
//! [`StagingScope`] removes its scratch directory when dropped without
//! [`StagingScope::finish`], so an aborted fetch leaves nothing behind.

use crate::config::RetryConfig;
use crate::error::{Error, Result, StagingError};
use crate::retry::with_retry;
use crate::types::TicketId;
use crate::utils::{FileCollisionAction, get_unique_path, move_file_no_clobber, regular_files};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A file moved into quarantine instead of the destination
#[derive(Clone, Debug, PartialEq)]
pub struct QuarantinedFile {
    /// Where the file now lives
    pub path: PathBuf,
    /// Why it could not be promoted
    pub reason: String,
}

/// What happened to the files of one fetch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromotionReport {
    /// Final destination paths of promoted files
    pub promoted: Vec<PathBuf>,
    /// Destination paths that were already occupied
    pub collisions: Vec<PathBuf>,
    /// Files relocated into quarantine
    pub quarantined: Vec<QuarantinedFile>,
    /// Human-readable per-file problems
    pub warnings: Vec<String>,
}

/// Hands out scratch scopes for fetches
#[derive(Clone, Debug)]
pub struct StagingGate {
    staging_root: PathBuf,
    quarantine_dir: PathBuf,
    retry: RetryConfig,
}

impl StagingGate {
    /// Create a gate rooted at `staging_root`
    pub fn new(
        staging_root: impl Into<PathBuf>,
        quarantine_dir: impl Into<PathBuf>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            staging_root: staging_root.into(),
            quarantine_dir: quarantine_dir.into(),
            retry,
        }
    }

    /// Open a scope for one fetch into `destination`
    ///
    /// With `sandbox` the fetch writes into a fresh scratch directory; without
    /// it the fetch writes straight into `destination` and the scope only
    /// tracks which files are new.
    pub async fn acquire(
        &self,
        destination: &Path,
        sandbox: bool,
        ticket: TicketId,
    ) -> Result<StagingScope> {
        tokio::fs::create_dir_all(destination).await?;

        let (scratch, preexisting) = if sandbox {
            let scratch = self.staging_root.join(format!("ticket-{}", ticket));
            // Leftovers from an earlier run must never be promoted
            if tokio::fs::try_exists(&scratch).await? {
                tracing::debug!(ticket_id = %ticket, path = %scratch.display(), "clearing stale scratch");
                tokio::fs::remove_dir_all(&scratch).await?;
            }
            tokio::fs::create_dir_all(&scratch).await?;
            (Some(scratch), HashSet::new())
        } else {
            let existing = regular_files(destination).await?.into_iter().collect();
            (None, existing)
        };

        Ok(StagingScope {
            destination: destination.to_path_buf(),
            scratch,
            preexisting,
            quarantine_dir: self.quarantine_dir.clone(),
            retry: self.retry.clone(),
            finished: false,
        })
    }
}

/// Scratch area for a single fetch
#[derive(Debug)]
pub struct StagingScope {
    destination: PathBuf,
    scratch: Option<PathBuf>,
    preexisting: HashSet<PathBuf>,
    quarantine_dir: PathBuf,
    retry: RetryConfig,
    finished: bool,
}

impl StagingScope {
    /// Directory the fetcher should write into
    pub fn output_dir(&self) -> &Path {
        self.scratch.as_deref().unwrap_or(&self.destination)
    }

    /// Whether output goes through scratch
    pub fn is_sandboxed(&self) -> bool {
        self.scratch.is_some()
    }

    /// Close the scope, promoting files if the fetch succeeded
    pub async fn finish(self, success: bool) -> PromotionReport {
        self.finish_with(success, &LocalFs).await
    }

    async fn finish_with(mut self, success: bool, fs: &dyn StagingFs) -> PromotionReport {
        self.finished = true;
        let mut report = PromotionReport::default();

        let Some(scratch) = self.scratch.clone() else {
            if success {
                match regular_files(&self.destination).await {
                    Ok(files) => {
                        report.promoted = files
                            .into_iter()
                            .filter(|f| !self.preexisting.contains(f))
                            .collect();
                    }
                    Err(e) => report
                        .warnings
                        .push(format!("could not list {}: {}", self.destination.display(), e)),
                }
            }
            return report;
        };

        if success {
            match regular_files(&scratch).await {
                Ok(files) => {
                    for file in files {
                        self.promote_one(&file, fs, &mut report).await;
                    }
                }
                Err(e) => report
                    .warnings
                    .push(format!("could not list {}: {}", scratch.display(), e)),
            }
        }

        self.discard_scratch(&scratch, fs, &mut report).await;
        report
    }

    async fn promote_one(&self, file: &Path, fs: &dyn StagingFs, report: &mut PromotionReport) {
        let Some(name) = file.file_name() else {
            return;
        };
        let target = self.destination.join(name);

        if let Err(Error::Staging(collision)) =
            get_unique_path(&target, FileCollisionAction::Skip)
        {
            tracing::warn!(file = %file.display(), error = %collision, "promotion skipped");
            report.warnings.push(collision.to_string());
            report.collisions.push(target);
            return;
        }

        // The move itself refuses an occupied target, so a concurrent
        // promotion that won the name shows up here as AlreadyExists
        match with_retry(&self.retry, || fs.move_file(file, &target)).await {
            Ok(()) => {
                tracing::debug!(file = %target.display(), "promoted");
                report.promoted.push(target);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let collision = StagingError::FileCollision {
                    path: target.clone(),
                    reason: "file already exists".to_string(),
                };
                tracing::warn!(file = %file.display(), error = %collision, "promotion skipped");
                report.warnings.push(collision.to_string());
                report.collisions.push(target);
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                self.quarantine(file, e.to_string(), fs, report).await;
            }
            Err(e) => {
                let failure = StagingError::MoveFailed {
                    source_path: file.to_path_buf(),
                    dest_path: target,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %failure, "promotion failed");
                report.warnings.push(failure.to_string());
            }
        }
    }

    /// Remove what is left in scratch, then scratch itself
    ///
    /// Unpromoted files (collisions, a failed fetch's partial output) are
    /// deleted. A file that keeps refusing deletion with a permission error
    /// goes to quarantine.
    async fn discard_scratch(
        &self,
        scratch: &Path,
        fs: &dyn StagingFs,
        report: &mut PromotionReport,
    ) {
        let leftovers = match regular_files(scratch).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(path = %scratch.display(), error = %e, "could not list scratch");
                Vec::new()
            }
        };

        for file in leftovers {
            match with_retry(&self.retry, || fs.remove_file(&file)).await {
                Ok(()) => tracing::trace!(file = %file.display(), "discarded"),
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    self.quarantine(&file, e.to_string(), fs, report).await;
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "could not discard");
                    report
                        .warnings
                        .push(format!("could not remove {}: {}", file.display(), e));
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(scratch).await {
            tracing::warn!(path = %scratch.display(), error = %e, "failed to remove scratch");
        }
    }

    /// Relocate `file` into quarantine and report it as a warning
    async fn quarantine(
        &self,
        file: &Path,
        reason: String,
        fs: &dyn StagingFs,
        report: &mut PromotionReport,
    ) {
        match self.move_to_quarantine(file, fs).await {
            Ok(path) => {
                tracing::warn!(
                    file = %file.display(),
                    quarantine = %path.display(),
                    reason = %reason,
                    "file quarantined"
                );
                report
                    .warnings
                    .push(format!("{} quarantined: {}", path.display(), reason));
                report.quarantined.push(QuarantinedFile { path, reason });
            }
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "quarantine failed");
                report.warnings.push(format!(
                    "{} could not be promoted, removed or quarantined: {}",
                    file.display(),
                    e
                ));
            }
        }
    }

    async fn move_to_quarantine(&self, file: &Path, fs: &dyn StagingFs) -> Result<PathBuf> {
        let name = file.file_name().ok_or_else(|| StagingError::InvalidPath {
            path: file.to_path_buf(),
            reason: "no file name".to_string(),
        })?;
        tokio::fs::create_dir_all(&self.quarantine_dir).await?;
        let target = get_unique_path(&self.quarantine_dir.join(name), FileCollisionAction::Rename)?;
        fs.move_file(file, &target).await?;
        Ok(target)
    }
}

/// File operations the gate performs on staged files
#[async_trait]
trait StagingFs: Send + Sync {
    /// Move `from` to `to`, failing with `AlreadyExists` if `to` is occupied
    async fn move_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;
    /// Delete a staged file
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

struct LocalFs;

#[async_trait]
impl StagingFs for LocalFs {
    async fn move_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        move_file_no_clobber(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

impl Drop for StagingScope {
    fn drop(&mut self) {
        if !self.finished
            && let Some(scratch) = &self.scratch
        {
            let _ = std::fs::remove_dir_all(scratch);
        }
    }
}
