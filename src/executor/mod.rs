//! Fetch execution
//!
//! [`FetchExecutor`] runs an [`Invocation`] through a [`Fetcher`], reports
//! progress, classifies the result into an [`ExecutionOutcome`] and keeps
//! the running attempt counters behind [`FetchExecutor::stats`].
//!
//! [`ProcessFetcher`] is the real implementation: it spawns the executable as
//! a supervised child process. Tests substitute scripted fetchers.

mod progress;
mod supervisor;

pub use progress::{MAX_EXCERPT_CHARS, parse_progress};
pub use supervisor::ExecutionLimits;

use crate::command::Invocation;
use crate::error::FetchError;
use crate::types::{ExecutionOutcome, FetchStats, Progress};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs one invocation to completion
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute `invocation`, calling `on_line` for every non-empty output line
    /// together with the progress it carries, if any
    async fn run(
        &self,
        invocation: &Invocation,
        limits: ExecutionLimits,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(Option<Progress>, &'l str) + Send),
    ) -> Result<(), FetchError>;
}

/// Fetcher backed by a real child process
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessFetcher;

#[async_trait]
impl Fetcher for ProcessFetcher {
    async fn run(
        &self,
        invocation: &Invocation,
        limits: ExecutionLimits,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(Option<Progress>, &'l str) + Send),
    ) -> Result<(), FetchError> {
        supervisor::supervise(invocation, limits, cancel, on_line).await
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Counted, limit-enforcing front for a [`Fetcher`]
#[derive(Clone)]
pub struct FetchExecutor {
    fetcher: Arc<dyn Fetcher>,
    limits: ExecutionLimits,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("limits", &self.limits)
            .field("stats", &self.stats())
            .finish()
    }
}

impl FetchExecutor {
    /// Create an executor around `fetcher`
    pub fn new(fetcher: Arc<dyn Fetcher>, limits: ExecutionLimits) -> Self {
        Self {
            fetcher,
            limits,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Configured limits
    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Run `invocation`, forwarding progress to `on_progress`
    ///
    /// Never fails: spawn errors, timeouts, cancellation and non-zero exits all
    /// come back as a failed [`ExecutionOutcome`].
    pub async fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(Progress, &str) + Send + Sync),
    ) -> ExecutionOutcome {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let mut last_percent = None;

        let result = {
            let mut on_line = |progress: Option<Progress>, line: &str| {
                if let Some(progress) = progress {
                    if let Progress::Percent(p) = progress {
                        last_percent = Some(p);
                    }
                    on_progress(progress, line);
                }
            };
            self.fetcher
                .run(invocation, self.limits, cancel, &mut on_line)
                .await
        };
        let duration = started.elapsed();

        match result {
            Ok(()) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    executable = %invocation.kind,
                    duration_ms = duration.as_millis() as u64,
                    "fetcher finished"
                );
                ExecutionOutcome {
                    success: true,
                    message: format!("completed with {}", invocation.kind),
                    failure: None,
                    duration,
                    last_percent,
                }
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(executable = %invocation.kind, error = %e, "fetcher failed");
                ExecutionOutcome {
                    success: false,
                    message: format!("{} {}", invocation.kind, e),
                    failure: Some(e.failure_kind()),
                    duration,
                    last_percent,
                }
            }
        }
    }

    /// Attempts so far: total, succeeded, failed
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            total: self.counters.total.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
