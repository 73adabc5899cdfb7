use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_state_transitions() {
    let (downloader, _fetcher, _temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    assert_eq!(downloader.state(), OrchestratorState::Idle);
    assert!(!downloader.pause_all().await, "cannot pause while idle");
    assert!(!downloader.resume_all().await);

    downloader.start().await.unwrap();
    assert_eq!(downloader.state(), OrchestratorState::Active);
    assert!(downloader.pause_all().await);
    assert_eq!(downloader.state(), OrchestratorState::Paused);
    assert!(!downloader.pause_all().await, "already paused");
    assert!(downloader.resume_all().await);
    assert_eq!(downloader.state(), OrchestratorState::Active);
    assert!(downloader.stop_all().await);
    assert_eq!(downloader.state(), OrchestratorState::Stopped);
    assert!(!downloader.stop_all().await);

    downloader.start().await.unwrap();
    assert_eq!(downloader.state(), OrchestratorState::Active);

    let states: Vec<OrchestratorState> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            Event::QueueStateChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            OrchestratorState::Active,
            OrchestratorState::Paused,
            OrchestratorState::Active,
            OrchestratorState::Stopped,
            OrchestratorState::Active,
        ]
    );
}

#[tokio::test]
async fn test_start_while_paused_resumes() {
    let (downloader, _fetcher, _temp_dir) = create_test_downloader().await;

    downloader.start().await.unwrap();
    downloader.pause_all().await;
    downloader.start().await.unwrap();
    assert_eq!(downloader.state(), OrchestratorState::Active);
}

#[tokio::test]
async fn test_pause_holds_new_submissions_until_resume() {
    let (downloader, fetcher, _temp_dir) = create_test_downloader().await;
    downloader.start().await.unwrap();
    assert!(downloader.pause_all().await);

    let d = downloader
        .submit("https://d.example/D", FetchOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(status_of(&downloader, d).await, ItemStatus::Pending);
    let snapshot = downloader.get_queue_snapshot().await;
    assert_eq!(snapshot[0].status, ItemStatus::Pending);
    assert!(fetcher.started().is_empty());

    assert!(downloader.resume_all().await);
    assert_eq!(wait_finished(&downloader, d).await.status, ItemStatus::Done);
}

#[tokio::test]
async fn test_pause_does_not_interrupt_running_item() {
    let (downloader, fetcher, _temp_dir) = create_test_downloader().await;
    fetcher.script("https://a.example/1", Script::succeed_with("a.bin").held());

    let running = downloader
        .submit("https://a.example/1", FetchOptions::default())
        .await
        .unwrap();
    let pending = downloader
        .submit("https://a.example/2", FetchOptions::default())
        .await
        .unwrap();
    downloader.start().await.unwrap();
    wait_until("first item running", async || {
        status_of(&downloader, running).await == ItemStatus::Running
    })
    .await;

    downloader.pause_all().await;
    fetcher.release(1);

    assert_eq!(
        wait_finished(&downloader, running).await.status,
        ItemStatus::Done
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status_of(&downloader, pending).await, ItemStatus::Pending);

    downloader.resume_all().await;
    assert_eq!(
        wait_finished(&downloader, pending).await.status,
        ItemStatus::Done
    );
}

#[tokio::test]
async fn test_stop_lets_running_items_finish_and_keeps_pending() {
    let (downloader, fetcher, _temp_dir) = create_test_downloader().await;
    fetcher.script("https://a.example/1", Script::succeed_with("a.bin").held());

    let running = downloader
        .submit("https://a.example/1", FetchOptions::default())
        .await
        .unwrap();
    let pending = downloader
        .submit("https://a.example/2", FetchOptions::default())
        .await
        .unwrap();
    downloader.start().await.unwrap();
    wait_until("first item running", async || {
        status_of(&downloader, running).await == ItemStatus::Running
    })
    .await;

    assert!(downloader.stop_all().await);
    fetcher.release(1);
    assert_eq!(
        wait_finished(&downloader, running).await.status,
        ItemStatus::Done
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status_of(&downloader, pending).await, ItemStatus::Pending);

    // A later start picks up where the queue left off
    downloader.start().await.unwrap();
    assert_eq!(
        wait_finished(&downloader, pending).await.status,
        ItemStatus::Done
    );
}

#[tokio::test]
async fn test_cancel_pending_removes_item() {
    let (downloader, fetcher, _temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    let id = downloader
        .submit("https://a.example/1", FetchOptions::default())
        .await
        .unwrap();
    downloader.cancel(id).await.unwrap();

    assert!(downloader.get_item(id).await.is_none());
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|event| matches!(event, Event::Removed { id: removed } if *removed == id))
    );

    downloader.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fetcher.started().is_empty());
    assert_eq!(downloader.stats().total, 0);
}

#[tokio::test]
async fn test_cancel_running_item_fails_it() {
    let (downloader, fetcher, _temp_dir) = create_test_downloader().await;
    fetcher.script("https://a.example/1", Script::succeed_with("a.bin").held());

    let id = downloader
        .submit("https://a.example/1", FetchOptions::default())
        .await
        .unwrap();
    let next = downloader
        .submit("https://b.example/2", FetchOptions::default())
        .await
        .unwrap();
    downloader.start().await.unwrap();
    wait_until("item running", async || {
        status_of(&downloader, id).await == ItemStatus::Running
    })
    .await;

    let mut events = downloader.subscribe();
    downloader.cancel(id).await.unwrap();

    let item = wait_finished(&downloader, id).await;
    assert_eq!(item.status, ItemStatus::Failed);
    assert!(item.message.unwrap().contains("cancelled"));
    assert!(drain_events(&mut events).iter().any(|event| matches!(
        event,
        Event::Failed { id: failed, failure: FailureKind::Cancelled, .. } if *failed == id
    )));

    // Cancellation says nothing about the executable
    assert!(downloader.registry().lookup("a.example").await.is_none());
    assert_eq!(wait_finished(&downloader, next).await.status, ItemStatus::Done);
}

#[tokio::test]
async fn test_cancel_finished_and_unknown_items() {
    let (downloader, _fetcher, _temp_dir) = create_test_downloader().await;

    let id = downloader
        .submit("https://a.example/1", FetchOptions::default())
        .await
        .unwrap();
    downloader.start().await.unwrap();
    wait_finished(&downloader, id).await;

    downloader.cancel(id).await.unwrap();
    assert_eq!(status_of(&downloader, id).await, ItemStatus::Done);

    assert!(matches!(
        downloader.cancel(TicketId::new(999)).await,
        Err(Error::NotFound(_))
    ));
}
