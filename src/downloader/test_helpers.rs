//! Shared test helpers: a scripted in-process fetcher and a downloader built
//! around it.

use crate::command::Invocation;
use crate::config::{Config, FallbackRule};
use crate::downloader::RoutedDownloader;
use crate::error::FetchError;
use crate::executor::{ExecutionLimits, Fetcher, parse_progress};
use crate::tools::ToolSet;
use crate::types::{Event, ExecutableKind, Progress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// What a scripted run does
#[derive(Clone, Debug, Default)]
pub(crate) struct Script {
    /// Output lines, parsed with the real progress rules
    pub(crate) lines: Vec<String>,
    /// Files written into the output directory: (name, contents)
    pub(crate) files: Vec<(String, String)>,
    /// Exit code; 0 is success
    pub(crate) exit_code: i32,
    /// Block until [`ScriptedFetcher::release`] hands out a permit
    pub(crate) hold: bool,
}

impl Script {
    pub(crate) fn succeed_with(file: &str) -> Self {
        Self {
            lines: vec!["[download]  50.0%".into()],
            files: vec![(file.into(), "data".into())],
            ..Self::default()
        }
    }

    pub(crate) fn fail(code: i32, line: &str) -> Self {
        Self {
            lines: vec![line.into()],
            exit_code: code,
            ..Self::default()
        }
    }

    pub(crate) fn held(mut self) -> Self {
        self.hold = true;
        self
    }
}

/// [`Fetcher`] that follows per-URL scripts instead of spawning processes
///
/// URLs without a script succeed and write `out.bin`.
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    /// URLs in the order their runs started
    started: Mutex<Vec<String>>,
    gate: Arc<Semaphore>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(0)),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    /// Let `n` held runs continue
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn run(
        &self,
        invocation: &Invocation,
        _limits: ExecutionLimits,
        cancel: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(Option<Progress>, &'l str) + Send),
    ) -> Result<(), FetchError> {
        let url = invocation
            .args
            .last()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Script::succeed_with("out.bin"));

        self.started.lock().unwrap().push(url);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = async {
            for line in &script.lines {
                on_line(parse_progress(invocation.kind, line), line);
            }

            if script.hold {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    permit = self.gate.acquire() => permit.unwrap().forget(),
                }
            }

            for (name, contents) in &script.files {
                tokio::fs::write(invocation.output_dir.join(name), contents)
                    .await
                    .unwrap();
            }

            if script.exit_code == 0 {
                Ok(())
            } else {
                Err(FetchError::NonZeroExit {
                    code: Some(script.exit_code),
                    excerpt: script.lines.last().cloned().unwrap_or_default(),
                })
            }
        }
        .await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Config rooted in `dir`, with seeding off and a fallback rule for
/// `video-host.example`
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.download.download_dir = dir.join("downloads");
    config.download.staging_dir = dir.join("staging");
    config.download.quarantine_dir = dir.join("quarantine");
    config.download.max_concurrent_downloads = 1;
    config.routing.seed_known_origins = false;
    config.routing.extra_fallback_rules = vec![FallbackRule {
        fragment: "video-host.example".into(),
        executable: ExecutableKind::VideoExtractor,
    }];
    config
}

/// Every executable kind "installed" at a fake path
pub(crate) fn all_tools() -> ToolSet {
    ToolSet::from_paths(
        ExecutableKind::ALL.map(|kind| (kind, PathBuf::from(format!("/fake/{}", kind)))),
    )
}

/// Helper to create a test RoutedDownloader around a scripted fetcher.
/// Returns the downloader, the fetcher and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (RoutedDownloader, Arc<ScriptedFetcher>, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    create_test_downloader_with(config, all_tools(), temp_dir).await
}

pub(crate) async fn create_test_downloader_with(
    config: Config,
    tools: ToolSet,
    temp_dir: TempDir,
) -> (RoutedDownloader, Arc<ScriptedFetcher>, TempDir) {
    let fetcher = ScriptedFetcher::new();
    let downloader = RoutedDownloader::from_parts(config, tools, fetcher.clone())
        .await
        .unwrap();
    (downloader, fetcher, temp_dir)
}

/// Wait until `check` holds or fail after five seconds
pub(crate) async fn wait_until<F>(what: &str, mut check: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
