//! Queue processor: the control loop that dispatches pending items in
//! submission order.

use crate::staging::QuarantinedFile;
use crate::types::{
    Event, ExecutableKind, ProgressUpdate, QueueItem, QueueState as OrchestratorState, TicketId,
};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use super::fetch_task::PipelineObserver;
use super::{LoopSignal, RoutedDownloader};

/// Routes pipeline notifications of a queued item into the book and events
struct QueueObserver<'a> {
    downloader: &'a RoutedDownloader,
    id: TicketId,
}

impl PipelineObserver for QueueObserver<'_> {
    fn started(&self, executable: ExecutableKind) {
        self.downloader.book().set_executable(self.id, executable);
        self.downloader.emit_event(Event::Started {
            id: self.id,
            executable,
        });
    }

    fn progress(&self, update: ProgressUpdate) {
        self.downloader.book().set_progress(self.id, update.percent);
        self.downloader.emit_event(Event::Progress {
            id: self.id,
            percent: update.percent,
            message: update.message,
        });
    }

    fn quarantined(&self, file: &QuarantinedFile) {
        self.downloader.emit_event(Event::Quarantined {
            id: self.id,
            path: file.path.clone(),
            reason: file.reason.clone(),
        });
    }
}

impl RoutedDownloader {
    /// Spawn the control loop
    ///
    /// The loop holds the signal receiver for its whole life, so a second
    /// loop spawned while one is still winding down simply waits for it.
    /// While the orchestrator is `Active` it dispatches the first pending
    /// item whenever a concurrency slot is free; otherwise it sleeps until
    /// the next signal. It exits once the state is `Stopped` (or `Idle`).
    pub(crate) fn spawn_control_loop(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();

        tokio::spawn(async move {
            let mut signals = downloader.queue_state.signal_rx.lock().await;
            // Anything queued before this loop owned the receiver is covered
            // by the dispatch pass below
            while signals.try_recv().is_ok() {}
            tracing::debug!("control loop started");

            loop {
                match downloader.state() {
                    OrchestratorState::Stopped | OrchestratorState::Idle => break,
                    OrchestratorState::Paused => {}
                    OrchestratorState::Active => downloader.dispatch_ready(),
                }

                match signals.recv().await {
                    Some(signal) => tracing::trace!(?signal, "control loop woken"),
                    None => break,
                }
            }

            tracing::debug!("control loop exited");
        })
    }

    /// Dispatch pending items until capacity or the queue runs out
    fn dispatch_ready(&self) {
        while self.state() == OrchestratorState::Active {
            let Ok(permit) = self
                .queue_state
                .concurrent_limit
                .clone()
                .try_acquire_owned()
            else {
                break;
            };
            let Some((item, cancel)) = self.book().start_next(&self.queue_state.shutdown) else {
                break;
            };

            tracing::info!(ticket_id = %item.id, url = %item.url, "dispatching");
            let downloader = self.clone();
            tokio::spawn(async move {
                downloader.run_queued(item, cancel, permit).await;
            });
        }
    }

    /// Run one dispatched item to its terminal state
    async fn run_queued(
        &self,
        item: QueueItem,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) {
        let id = item.id;
        let observer = QueueObserver {
            downloader: self,
            id,
        };

        let outcome = self
            .run_pipeline(id, &item.url, &item.options, &cancel, &observer)
            .await;

        // The terminal event goes out under the book lock, so anyone who sees
        // the terminal status can also see the event
        let mut book = self.book();
        book.finish(id, outcome.success, outcome.message.clone());

        if outcome.success {
            tracing::info!(ticket_id = %id, files = outcome.files.len(), "fetch complete");
            if let Some(executable) = outcome.executable {
                self.emit_event(Event::Completed {
                    id,
                    executable,
                    files: outcome.files,
                });
            }
        } else {
            tracing::warn!(ticket_id = %id, error = %outcome.message, "fetch failed");
            if let Some(failure) = outcome.failure {
                self.emit_event(Event::Failed {
                    id,
                    error: outcome.message,
                    failure,
                });
            }
        }
        drop(book);

        // Release the slot before waking the loop so it can be reused at once
        drop(permit);
        self.signal(LoopSignal::Finished);
    }
}
