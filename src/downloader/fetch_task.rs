//! The fetch pipeline: safety gate, resolver, builder, staging, executor,
//! promotion and registry update.

use crate::command;
use crate::error::Error;
use crate::origin::extract_origin;
use crate::registry::FetchReport;
use crate::staging::QuarantinedFile;
use crate::types::{
    ExecutableKind, FailureKind, FetchOptions, FetchOutcome, Progress, ProgressUpdate, TicketId,
};
use tokio_util::sync::CancellationToken;

use super::RoutedDownloader;

/// Message of an item rejected by the safety gate
pub(crate) const BLOCKED_BY_POLICY: &str = "blocked by policy";

/// Receives notifications while one fetch runs
pub(crate) trait PipelineObserver: Send + Sync {
    /// The executable has been chosen
    fn started(&self, executable: ExecutableKind);
    /// A non-terminal progress report
    fn progress(&self, update: ProgressUpdate);
    /// A staged file went to quarantine
    fn quarantined(&self, file: &QuarantinedFile);
}

impl RoutedDownloader {
    /// Run one fetch end to end
    ///
    /// Never fails: every problem becomes a failed [`FetchOutcome`]. Reports
    /// an initial 0% progress before anything else happens.
    pub(crate) async fn run_pipeline(
        &self,
        ticket: TicketId,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> FetchOutcome {
        let pipeline = &self.pipeline;
        observer.progress(ProgressUpdate::running("starting", Progress::Percent(0)));

        if !pipeline.safety.is_allowed(url) {
            tracing::warn!(ticket_id = %ticket, url, "blocked by safety policy");
            return FetchOutcome::failed(BLOCKED_BY_POLICY, FailureKind::BlockedByPolicy);
        }

        let origin = match extract_origin(url) {
            Ok(origin) => origin,
            Err(e) => return FetchOutcome::failed(e.to_string(), FailureKind::InvalidUrl),
        };

        let resolution = match pipeline
            .resolver
            .resolve(url, options.forced_executable)
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => return FetchOutcome::failed(e.to_string(), FailureKind::InvalidUrl),
        };
        let executable = resolution.executable;
        tracing::info!(
            ticket_id = %ticket,
            origin = %origin,
            executable = %executable,
            source = ?resolution.source,
            "resolved"
        );

        // Not the executable's fault, so the registry is left alone
        let Some(program) = pipeline.tools.path(executable) else {
            let mut outcome = FetchOutcome::failed(
                format!("{} is not installed", executable),
                FailureKind::ExecutableUnavailable,
            );
            outcome.executable = Some(executable);
            return outcome;
        };
        observer.started(executable);

        let destination = options
            .target_dir
            .clone()
            .unwrap_or_else(|| self.config.download_dir().to_path_buf());
        let sandbox = options
            .sandbox
            .unwrap_or(self.config.download.sandbox_enabled);

        let scope = match pipeline.staging.acquire(&destination, sandbox, ticket).await {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(ticket_id = %ticket, error = %e, "could not prepare output directory");
                let mut outcome = FetchOutcome::failed(
                    format!("could not prepare output directory: {}", e),
                    FailureKind::Staging,
                );
                outcome.executable = Some(executable);
                return outcome;
            }
        };

        let settings = self.command_settings(options.quality.as_deref());
        let invocation =
            match command::build(executable, program, url, scope.output_dir(), &settings).await {
                Ok(invocation) => invocation,
                Err(e) => {
                    let kind = match e {
                        Error::UnsupportedExecutable(_) => FailureKind::UnsupportedExecutable,
                        _ => FailureKind::Staging,
                    };
                    let mut outcome = FetchOutcome::failed(e.to_string(), kind);
                    outcome.executable = Some(executable);
                    return outcome;
                }
            };

        let execution = pipeline
            .executor
            .execute(&invocation, cancel, &|progress: Progress, line: &str| {
                observer.progress(ProgressUpdate::running(line, progress));
            })
            .await;

        let promotion = scope.finish(execution.success).await;
        for file in &promotion.quarantined {
            observer.quarantined(file);
        }

        // Neither cancellation nor a failed spawn says anything about how well
        // the executable serves this origin
        if !matches!(
            execution.failure,
            Some(FailureKind::Cancelled | FailureKind::ExecutableUnavailable)
        ) {
            pipeline
                .registry
                .record_fetch(&FetchReport {
                    origin: &origin,
                    url,
                    executable,
                    success: execution.success,
                    duration: execution.duration,
                    files_produced: promotion.promoted.len() as u64,
                    error_message: (!execution.success).then_some(execution.message.as_str()),
                })
                .await;
        }

        let message = if execution.success {
            match promotion.promoted.len() {
                1 => format!("fetched 1 file with {}", executable),
                n => format!("fetched {} files with {}", n, executable),
            }
        } else {
            execution.message
        };

        FetchOutcome {
            success: execution.success,
            message,
            failure: execution.failure,
            executable: Some(executable),
            files: promotion.promoted,
            warnings: promotion.warnings,
        }
    }
}
