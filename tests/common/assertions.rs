//! Custom test assertions for integration tests

use routed_dl::{QueueItem, RoutedDownloader, TicketId};
use std::time::Duration;

/// Poll the queue until `id` is `Done` or `Failed`
///
/// Panics if it takes longer than `timeout` or the item disappears.
pub async fn wait_for_terminal(
    downloader: &RoutedDownloader,
    id: TicketId,
    timeout: Duration,
) -> QueueItem {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let item = downloader
            .get_item(id)
            .await
            .unwrap_or_else(|| panic!("ticket {id} vanished from the queue"));
        if item.status.is_terminal() {
            return item;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "ticket {id} still {:?} after {:?}",
            item.status,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether a live process with this pid exists
///
/// Zombies count as gone: a killed orphan lingers until init reaps it.
pub fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    !std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// Poll until `pid` is gone; false if it is still alive after `timeout`
pub async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while process_exists(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}
