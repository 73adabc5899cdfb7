//! Orchestrator control: start, pause, resume, stop and per-item cancel.

use crate::error::{Error, Result};
use crate::types::{Event, QueueState as OrchestratorState, TicketId};
use std::sync::atomic::Ordering;

use super::{LoopSignal, RoutedDownloader};

impl RoutedDownloader {
    /// Atomically move from any state in `from` to `to`
    ///
    /// Returns the previous state when the transition happened.
    fn transition(
        &self,
        from: &[OrchestratorState],
        to: OrchestratorState,
    ) -> Option<OrchestratorState> {
        let result = self.queue_state.state.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| {
                from.contains(&OrchestratorState::from_u8(current))
                    .then_some(to.to_u8())
            },
        );

        let previous = OrchestratorState::from_u8(result.ok()?);
        tracing::info!(from = ?previous, to = ?to, "orchestrator state changed");
        self.emit_event(Event::QueueStateChanged { state: to });
        self.signal(LoopSignal::StateChanged);
        Some(previous)
    }

    /// Start dispatching pending items
    ///
    /// Moves `Idle` or `Stopped` to `Active` and launches the control loop.
    /// Starting a `Paused` orchestrator resumes it; starting an `Active` one
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if self
            .transition(
                &[OrchestratorState::Idle, OrchestratorState::Stopped],
                OrchestratorState::Active,
            )
            .is_some()
        {
            self.spawn_control_loop();
        } else {
            self.resume_all().await;
        }
        Ok(())
    }

    /// Stop picking new items; running items continue
    ///
    /// Returns false if the orchestrator was not `Active`.
    pub async fn pause_all(&self) -> bool {
        self.transition(&[OrchestratorState::Active], OrchestratorState::Paused)
            .is_some()
    }

    /// Resume picking items after [`pause_all`](Self::pause_all)
    ///
    /// Returns false if the orchestrator was not `Paused`.
    pub async fn resume_all(&self) -> bool {
        self.transition(&[OrchestratorState::Paused], OrchestratorState::Active)
            .is_some()
    }

    /// Stop picking items and mark the orchestrator `Stopped`
    ///
    /// Running items are allowed to finish. Pending items stay pending and
    /// are picked up by a later [`start`](Self::start).
    pub async fn stop_all(&self) -> bool {
        self.transition(
            &[OrchestratorState::Active, OrchestratorState::Paused],
            OrchestratorState::Stopped,
        )
        .is_some()
    }

    /// Cancel an item
    ///
    /// A pending item is removed outright. For a running item this requests
    /// termination of its process; the item becomes `Failed` once the process
    /// has actually exited. Cancelling a finished item does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ticket.
    pub async fn cancel(&self, id: TicketId) -> Result<()> {
        let mut book = self.book();

        if book.remove_pending(id).is_some() {
            drop(book);
            tracing::info!(ticket_id = %id, "pending item removed");
            self.emit_event(Event::Removed { id });
            return Ok(());
        }

        if let Some(token) = book.running_token(id) {
            tracing::info!(ticket_id = %id, "cancelling running item");
            token.cancel();
            return Ok(());
        }

        match book.get(id) {
            Some(item) if item.status.is_terminal() => Ok(()),
            _ => Err(Error::NotFound(format!("ticket {}", id))),
        }
    }
}
