use super::*;
use crate::types::{Category, ExecutableKind};
use tempfile::{NamedTempFile, TempDir};

async fn create_registry() -> (ConfidenceRegistry, Arc<Database>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
    (ConfidenceRegistry::new(db.clone()), db, temp_file)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_nudge_success_and_failure_steps() {
    assert!(approx(nudge(0.5, true), 0.51));
    assert!(approx(nudge(0.5, false), 0.45));
    assert!(approx(nudge(0.2, false), 0.15));
}

#[test]
fn test_nudge_is_clamped() {
    assert!(approx(nudge(0.99, true), 0.99));
    assert!(approx(nudge(0.985, true), 0.99));
    assert!(approx(nudge(0.03, false), 0.01));
    assert!(approx(nudge(0.01, false), 0.01));
}

#[test]
fn test_failure_penalty_is_five_times_success_reward() {
    let mut start = 0.10;
    while start <= 0.94 {
        let up = nudge(start, true) - start;
        let down = start - nudge(start, false);
        assert!(approx(down, 5.0 * up), "asymmetry broken at {}", start);
        start += 0.07;
    }
}

#[test]
fn test_repeated_successes_never_exceed_cap() {
    let mut confidence = INITIAL_FAILURE_CONFIDENCE;
    for _ in 0..200 {
        let next = nudge(confidence, true);
        assert!(next >= confidence);
        assert!(next <= MAX_CONFIDENCE);
        if confidence < MAX_CONFIDENCE {
            assert!(next > confidence, "must increase strictly until the cap");
        }
        confidence = next;
    }
    assert!(approx(confidence, MAX_CONFIDENCE));
}

#[test]
fn test_url_fingerprint_is_short_hex_and_stable() {
    let a = url_fingerprint("https://video.example/watch?v=secret");
    assert_eq!(a.len(), 16);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(a, url_fingerprint("https://video.example/watch?v=secret"));
    assert_ne!(a, url_fingerprint("https://video.example/watch?v=other"));
}

#[tokio::test]
async fn test_first_failure_creates_low_confidence_record() {
    let (registry, _db, _tmp) = create_registry().await;

    let record = registry
        .record_outcome("video-host.example", ExecutableKind::VideoExtractor, false)
        .await
        .unwrap();
    assert_eq!(record.origin, "video-host.example");
    assert_eq!(record.executable, ExecutableKind::VideoExtractor);
    assert!(approx(record.confidence, 0.2));
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.success_count, 0);

    let stored = registry.lookup("video-host.example").await.unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_first_success_creates_high_confidence_record() {
    let (registry, _db, _tmp) = create_registry().await;

    let record = registry
        .record_outcome("files.example", ExecutableKind::TransferClient, true)
        .await
        .unwrap();
    assert!(approx(record.confidence, 0.8));
    assert_eq!(record.success_count, 1);
    assert_eq!(record.category, Category::Unknown);
}

#[tokio::test]
async fn test_same_executable_outcomes_nudge_confidence() {
    let (registry, _db, _tmp) = create_registry().await;

    registry
        .record_outcome("a.example", ExecutableKind::VideoExtractor, true)
        .await;
    let after_success = registry
        .record_outcome("a.example", ExecutableKind::VideoExtractor, true)
        .await
        .unwrap();
    assert!(approx(after_success.confidence, 0.81));
    assert_eq!(after_success.success_count, 2);

    let after_failure = registry
        .record_outcome("a.example", ExecutableKind::VideoExtractor, false)
        .await
        .unwrap();
    assert!(approx(after_failure.confidence, 0.76));
    assert_eq!(after_failure.failure_count, 1);
}

#[tokio::test]
async fn test_other_executable_success_replaces_weak_record() {
    let (registry, _db, _tmp) = create_registry().await;

    registry
        .record_outcome("mixed.example", ExecutableKind::VideoExtractor, false)
        .await;
    let replaced = registry
        .record_outcome("mixed.example", ExecutableKind::GalleryExtractor, true)
        .await
        .unwrap();

    assert_eq!(replaced.executable, ExecutableKind::GalleryExtractor);
    assert!(approx(replaced.confidence, 0.8));
    assert_eq!(replaced.success_count, 1);
    assert_eq!(replaced.failure_count, 0);
}

#[tokio::test]
async fn test_other_executable_does_not_displace_strong_record() {
    let (registry, _db, _tmp) = create_registry().await;

    registry.seed(&KNOWN_ORIGINS[..1]).await.unwrap(); // youtube.com, 0.98

    let kept = registry
        .record_outcome("youtube.com", ExecutableKind::HttpFetcher, true)
        .await
        .unwrap();
    assert_eq!(kept.executable, ExecutableKind::VideoExtractor);
    assert!(approx(kept.confidence, 0.98));

    let kept = registry
        .record_outcome("youtube.com", ExecutableKind::HttpFetcher, false)
        .await
        .unwrap();
    assert_eq!(kept.executable, ExecutableKind::VideoExtractor);
    assert!(approx(kept.confidence, 0.98));
}

#[tokio::test]
async fn test_concurrent_outcomes_are_not_lost() {
    let (registry, _db, _tmp) = create_registry().await;
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .record_outcome("busy.example", ExecutableKind::VideoExtractor, true)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = registry.lookup("busy.example").await.unwrap();
    assert_eq!(record.success_count, 20);
    assert!(approx(record.confidence, 0.99));
}

#[tokio::test]
async fn test_storage_failure_is_fail_open() {
    let (registry, db, _tmp) = create_registry().await;

    registry
        .record_outcome("a.example", ExecutableKind::VideoExtractor, true)
        .await;
    db.pool().close().await;

    assert!(registry.lookup("a.example").await.is_none());
    assert!(
        registry
            .record_outcome("a.example", ExecutableKind::VideoExtractor, true)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_seed_and_refresh_are_distinct() {
    let (registry, _db, _tmp) = create_registry().await;

    let inserted = registry.seed(KNOWN_ORIGINS).await.unwrap();
    assert_eq!(inserted, KNOWN_ORIGINS.len());
    assert_eq!(registry.seed(KNOWN_ORIGINS).await.unwrap(), 0, "seeding is idempotent");

    for _ in 0..10 {
        registry
            .record_outcome("imgur.com", ExecutableKind::GalleryExtractor, false)
            .await;
    }
    let degraded = registry.lookup("imgur.com").await.unwrap();
    assert!(approx(degraded.confidence, 0.40));

    registry.seed(KNOWN_ORIGINS).await.unwrap();
    let still = registry.lookup("imgur.com").await.unwrap();
    assert!(approx(still.confidence, 0.40), "seed must not overwrite");

    registry.refresh_seeds(KNOWN_ORIGINS).await.unwrap();
    let refreshed = registry.lookup("imgur.com").await.unwrap();
    assert!(approx(refreshed.confidence, 0.90), "refresh must overwrite");
    assert_eq!(refreshed.failure_count, 10, "refresh keeps learned counters");
}

#[tokio::test]
async fn test_all_with_confidence_above_is_descending() {
    let (registry, _db, _tmp) = create_registry().await;
    registry.seed(KNOWN_ORIGINS).await.unwrap();
    registry
        .record_outcome("weak.example", ExecutableKind::VideoExtractor, false)
        .await;

    let records = registry.all_with_confidence_above(0.5).await.unwrap();
    assert_eq!(records.len(), KNOWN_ORIGINS.len());
    assert!(records.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert!(records.iter().all(|r| r.origin != "weak.example"));
    assert_eq!(records[0].confidence, 0.98);
}

#[tokio::test]
async fn test_record_fetch_appends_history_without_full_url() {
    let (registry, _db, _tmp) = create_registry().await;

    let url = "https://clips.example/watch?v=private-token";
    registry
        .record_fetch(&FetchReport {
            origin: "clips.example",
            url,
            executable: ExecutableKind::VideoExtractor,
            success: false,
            duration: Duration::from_millis(1500),
            files_produced: 0,
            error_message: Some("exited with code 1: ERROR"),
        })
        .await
        .unwrap();

    let history = registry.history(None, 10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    let entry = &history[0];
    assert_eq!(entry.origin, "clips.example");
    assert_eq!(entry.executable, "yt-dlp");
    assert_eq!(entry.url_hash.as_deref(), Some(url_fingerprint(url).as_str()));
    assert!(!entry.url_hash.as_deref().unwrap().contains("private"));
    assert_eq!(entry.error_message.as_deref(), Some("exited with code 1: ERROR"));
    assert!(approx(entry.duration.as_secs_f64(), 1.5));

    let record = registry.lookup("clips.example").await.unwrap();
    assert_eq!(record.failure_count, 1);
}

#[tokio::test]
async fn test_cleanup_history_removes_old_entries() {
    let (registry, db, _tmp) = create_registry().await;

    let now = Utc::now().timestamp();
    for age_days in [45_i64, 31, 2] {
        db.insert_history(&NewHistoryEntry {
            origin: "a.example".to_string(),
            url_hash: None,
            executable: "wget".to_string(),
            success: true,
            duration_secs: 1.0,
            files_produced: 1,
            error_message: None,
            recorded_at: now - age_days * 86_400,
        })
        .await
        .unwrap();
    }

    assert_eq!(registry.cleanup_history(30).await.unwrap(), 2);
    assert_eq!(registry.history(None, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stats_aggregate_counters() {
    let (registry, _db, _tmp) = create_registry().await;

    let empty = registry.stats().await.unwrap();
    assert_eq!(empty, RegistryStats::default());

    registry
        .record_outcome("a.example", ExecutableKind::VideoExtractor, true)
        .await;
    registry
        .record_outcome("b.example", ExecutableKind::VideoExtractor, false)
        .await;

    let stats = registry.stats().await.unwrap();
    assert_eq!(stats.total_origins, 2);
    assert!(approx(stats.average_confidence, 0.5));
    assert_eq!(stats.total_successes, 1);
    assert_eq!(stats.total_failures, 1);
}

#[tokio::test]
async fn test_export_report_writes_json_document() {
    let (registry, _db, _tmp) = create_registry().await;
    registry.seed(&KNOWN_ORIGINS[..3]).await.unwrap();
    registry
        .record_outcome("weak.example", ExecutableKind::VideoExtractor, false)
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reports").join("origins.json");
    let exported = registry.export_report(&path).await.unwrap();
    assert_eq!(exported, 3);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["total_sites"], 3);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["export_date"].is_string());
    assert_eq!(json["sites"][0]["origin"], "youtube.com");
    assert_eq!(json["sites"][0]["executable"], "yt-dlp");
    assert_eq!(json["sites"][0]["category"], "video");
}
