//! Shutdown coordination.

use crate::error::Result;
use crate::types::{Event, QueueState as OrchestratorState};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{LoopSignal, RoutedDownloader};

/// How long shutdown waits for cancelled fetches to wind down
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

impl RoutedDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting submissions and single-shot fetches
    /// 2. Marks the orchestrator `Stopped` so no pending item is picked
    /// 3. Cancels every in-flight fetch (queued and single-shot)
    /// 4. Waits up to 30 seconds for their processes to exit
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Pending items stay in the queue snapshot as `Pending`.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; the `Result` leaves room for persistence
    /// steps that can fail.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        let previous = self
            .queue_state
            .state
            .swap(OrchestratorState::Stopped.to_u8(), Ordering::SeqCst);
        if OrchestratorState::from_u8(previous) != OrchestratorState::Stopped {
            self.emit_event(Event::QueueStateChanged {
                state: OrchestratorState::Stopped,
            });
        }
        self.signal(LoopSignal::StateChanged);

        self.queue_state.shutdown.cancel();
        tracing::info!("Signaled cancellation to all in-flight fetches");

        match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.wait_for_running()).await {
            Ok(()) => tracing::info!("All running fetches finished"),
            Err(_) => tracing::warn!(
                running = self.book().running_count(),
                "Timeout waiting for fetches to finish, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Poll until no queue item is running
    async fn wait_for_running(&self) {
        loop {
            let running = self.book().running_count();
            if running == 0 {
                return;
            }
            tracing::debug!(running, "Waiting for running fetches to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
