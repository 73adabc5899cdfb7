//! Dry-run resolution, support tests, single-shot fetches and registry
//! maintenance.

use crate::error::{Error, Result};
use crate::registry::KNOWN_ORIGINS;
use crate::staging::QuarantinedFile;
use crate::types::{
    Event, ExecutableKind, FetchOptions, FetchOutcome, FetchStats, ProgressUpdate, RegistryStats,
    TicketId,
};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

use super::RoutedDownloader;
use super::fetch_task::PipelineObserver;

/// Forwards pipeline progress of a single-shot fetch to the caller's callback
struct CallbackObserver<'a, F> {
    downloader: &'a RoutedDownloader,
    ticket: TicketId,
    on_progress: &'a F,
    /// Last numeric percentage reported, for the terminal failure report
    last_percent: AtomicI32,
}

impl<F> PipelineObserver for CallbackObserver<'_, F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn started(&self, executable: ExecutableKind) {
        tracing::debug!(ticket_id = %self.ticket, executable = %executable, "single-shot fetch started");
    }

    fn progress(&self, update: ProgressUpdate) {
        if update.percent >= 0 {
            self.last_percent.store(update.percent, Ordering::Relaxed);
        }
        (self.on_progress)(update);
    }

    fn quarantined(&self, file: &QuarantinedFile) {
        self.downloader.emit_event(Event::Quarantined {
            id: self.ticket,
            path: file.path.clone(),
            reason: file.reason.clone(),
        });
    }
}

impl RoutedDownloader {
    /// Resolve a URL to an executable without running anything
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL has no parsable authority.
    pub async fn test_resolution(&self, url: &str) -> Result<ExecutableKind> {
        let resolution = self.pipeline.resolver.resolve(url.trim(), None).await?;
        tracing::debug!(url, executable = %resolution.executable, source = ?resolution.source, "dry-run resolution");
        Ok(resolution.executable)
    }

    /// Whether a URL can be fetched with the executables on this host
    ///
    /// Returns `(supported, message)`; the message names the executable or
    /// explains why the URL is unsupported.
    pub async fn test_site_support(&self, url: &str) -> (bool, String) {
        match self.test_resolution(url).await {
            Ok(executable) if self.pipeline.tools.is_available(executable) => {
                (true, format!("supported by {}", executable))
            }
            Ok(executable) => (false, format!("{} not available", executable)),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Run one fetch immediately, outside the queue
    ///
    /// `on_progress` is called at least once at start (0%) and exactly once
    /// with the terminal report: 100% on success, or `success == false` with
    /// the last known percentage on failure. Cancelled by
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after shutdown. Every other problem is
    /// reported through the returned [`FetchOutcome`].
    pub async fn fetch<F>(
        &self,
        url: &str,
        options: FetchOptions,
        on_progress: F,
    ) -> Result<FetchOutcome>
    where
        F: Fn(ProgressUpdate) + Send + Sync,
    {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let ticket = TicketId::new(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel = self.queue_state.shutdown.child_token();
        let observer = CallbackObserver {
            downloader: self,
            ticket,
            on_progress: &on_progress,
            last_percent: AtomicI32::new(0),
        };

        let url = url.trim();
        tracing::info!(ticket_id = %ticket, url, "single-shot fetch");
        let outcome = self
            .run_pipeline(ticket, url, &options, &cancel, &observer)
            .await;

        let percent = if outcome.success {
            100
        } else {
            observer.last_percent.load(Ordering::Relaxed)
        };
        on_progress(ProgressUpdate {
            success: outcome.success,
            message: outcome.message.clone(),
            percent,
        });

        Ok(outcome)
    }

    /// Executor counters: total attempted, succeeded, failed
    pub fn stats(&self) -> FetchStats {
        self.pipeline.executor.stats()
    }

    /// Aggregate statistics of the confidence registry
    pub async fn registry_stats(&self) -> Result<RegistryStats> {
        self.pipeline.registry.stats().await
    }

    /// Re-apply the built-in seed table, overwriting routing of seeded origins
    ///
    /// Returns the number of records written.
    pub async fn refresh_seeds(&self) -> Result<usize> {
        self.pipeline.registry.refresh_seeds(KNOWN_ORIGINS).await
    }

    /// Write the supported-origins report to `path`
    ///
    /// Returns the number of origins exported.
    pub async fn export_report(&self, path: impl AsRef<Path>) -> Result<usize> {
        self.pipeline.registry.export_report(path.as_ref()).await
    }

    /// Delete fetch history older than the configured retention
    pub async fn cleanup_history(&self) -> Result<u64> {
        self.pipeline
            .registry
            .cleanup_history(self.config.persistence.history_retention_days)
            .await
    }
}
