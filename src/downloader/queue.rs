//! Queue bookkeeping: submission order, item state and maintenance.

use crate::error::{Error, Result};
use crate::origin::extract_origin;
use crate::types::{Event, ExecutableKind, FetchOptions, ItemStatus, QueueItem, TicketId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use super::{LoopSignal, RoutedDownloader};

/// Items in submission order plus the cancel tokens of running ones
///
/// Every status change goes through these methods, and statuses only ever
/// move forward: Pending, Running, then Done or Failed.
#[derive(Debug, Default)]
pub(crate) struct QueueBook {
    items: Vec<QueueItem>,
    running: HashMap<TicketId, CancellationToken>,
}

impl QueueBook {
    pub(crate) fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    /// Mark the first pending item `Running` and hand out a copy of it
    ///
    /// The item's cancel token is a child of `parent`.
    pub(crate) fn start_next(
        &mut self,
        parent: &CancellationToken,
    ) -> Option<(QueueItem, CancellationToken)> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.status == ItemStatus::Pending)?;
        item.status = ItemStatus::Running;
        let token = parent.child_token();
        self.running.insert(item.id, token.clone());
        Some((item.clone(), token))
    }

    pub(crate) fn get(&self, id: TicketId) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: TicketId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Remove a pending item; running and finished items are left alone
    pub(crate) fn remove_pending(&mut self, id: TicketId) -> Option<QueueItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id && item.status == ItemStatus::Pending)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn running_token(&self, id: TicketId) -> Option<&CancellationToken> {
        self.running.get(&id)
    }

    pub(crate) fn running_count(&self) -> usize {
        self.running.len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .count()
    }

    pub(crate) fn set_progress(&mut self, id: TicketId, percent: i32) {
        if let Some(item) = self.get_mut(id)
            && item.status == ItemStatus::Running
        {
            item.progress_percent = percent;
        }
    }

    pub(crate) fn set_executable(&mut self, id: TicketId, executable: ExecutableKind) {
        if let Some(item) = self.get_mut(id) {
            item.assigned_executable = Some(executable);
        }
    }

    /// Move a running item to its terminal status
    pub(crate) fn finish(&mut self, id: TicketId, success: bool, message: String) {
        self.running.remove(&id);
        if let Some(item) = self.get_mut(id)
            && item.status == ItemStatus::Running
        {
            if success {
                item.status = ItemStatus::Done;
                item.progress_percent = 100;
            } else {
                item.status = ItemStatus::Failed;
            }
            item.message = Some(message);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<QueueItem> {
        self.items.clone()
    }

    /// Drop items matching `remove`; returns the removed items
    fn drain_where(&mut self, remove: impl Fn(&QueueItem) -> bool) -> Vec<QueueItem> {
        let (removed, kept) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| remove(item));
        self.items = kept;
        removed
    }
}

impl RoutedDownloader {
    /// Lock the queue book, recovering from poisoning
    ///
    /// Every book method leaves it consistent even if interrupted.
    pub(crate) fn book(&self) -> MutexGuard<'_, QueueBook> {
        self.queue_state
            .book
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a URL to the end of the queue
    ///
    /// The item starts `Pending`. It is dispatched once the orchestrator is
    /// `Active` and every earlier item has been dispatched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL has no parsable authority
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn submit(&self, url: &str, options: FetchOptions) -> Result<TicketId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let url = url.trim();
        extract_origin(url)?;

        let id = TicketId::new(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let item = QueueItem {
            id,
            url: url.to_string(),
            options,
            status: ItemStatus::Pending,
            progress_percent: 0,
            assigned_executable: None,
            message: None,
            submitted_at: Utc::now(),
        };

        self.book().push(item);
        tracing::info!(ticket_id = %id, url, "queued");
        self.emit_event(Event::Queued {
            id,
            url: url.to_string(),
        });
        self.signal(LoopSignal::Submitted);

        Ok(id)
    }

    /// Copy of every item, in submission order
    pub async fn get_queue_snapshot(&self) -> Vec<QueueItem> {
        self.book().snapshot()
    }

    /// Copy of one item
    pub async fn get_item(&self, id: TicketId) -> Option<QueueItem> {
        self.book().get(id).cloned()
    }

    /// Number of pending and running items
    pub async fn queue_depth(&self) -> (usize, usize) {
        let book = self.book();
        (book.pending_count(), book.running_count())
    }

    /// Drop `Done` and `Failed` items; returns how many were dropped
    pub async fn clear_finished(&self) -> usize {
        let removed = self.book().drain_where(|item| item.status.is_terminal());
        tracing::debug!(count = removed.len(), "cleared finished items");
        removed.len()
    }

    /// Drop every item that is not running; returns how many were dropped
    ///
    /// Pending items are reported with [`Event::Removed`].
    pub async fn clear_queue(&self) -> usize {
        let removed = self
            .book()
            .drain_where(|item| item.status != ItemStatus::Running);
        for item in removed.iter().filter(|i| i.status == ItemStatus::Pending) {
            self.emit_event(Event::Removed { id: item.id });
        }
        tracing::debug!(count = removed.len(), "cleared queue");
        removed.len()
    }
}
