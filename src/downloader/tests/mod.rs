use super::test_helpers::{
    Script, all_tools, create_test_downloader, create_test_downloader_with, drain_events,
    test_config, wait_until,
};
use super::*;
use crate::types::{
    ExecutableKind, FailureKind, FetchOptions, ItemStatus, ProgressUpdate, QueueState as OrchestratorState,
    TicketId,
};
use std::sync::Mutex;
use tempfile::tempdir;

mod control;

/// Wait until the item reaches a terminal status and return it
async fn wait_finished(downloader: &RoutedDownloader, id: TicketId) -> crate::types::QueueItem {
    wait_until("item to finish", async || {
        downloader
            .get_item(id)
            .await
            .is_some_and(|item| item.status.is_terminal())
    })
    .await;
    downloader.get_item(id).await.unwrap()
}

async fn status_of(downloader: &RoutedDownloader, id: TicketId) -> ItemStatus {
    downloader.get_item(id).await.unwrap().status
}
