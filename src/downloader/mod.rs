//! Queue orchestrator and caller API, split into focused submodules.
//!
//! The `RoutedDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Submission, snapshots and queue maintenance
//! - [`control`] - Orchestrator state (start/pause/resume/stop) and cancellation
//! - [`queue_processor`] - The control loop that dispatches pending items
//! - [`fetch_task`] - The fetch pipeline shared by queued and single-shot fetches
//! - [`routing`] - Dry-run resolution, support tests and registry maintenance
//! - [`lifecycle`] - Graceful shutdown
//! - [`safety`] - The pre-dispatch safety gate

mod control;
mod fetch_task;
mod lifecycle;
mod queue;
mod queue_processor;
mod routing;
mod safety;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use safety::{AllowAll, SafetyPolicy};

use crate::command::CommandSettings;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::executor::{ExecutionLimits, FetchExecutor, Fetcher, ProcessFetcher};
use crate::registry::{ConfidenceRegistry, KNOWN_ORIGINS};
use crate::resolver::Resolver;
use crate::staging::StagingGate;
use crate::tools::ToolSet;
use crate::types::{Event, QueueState as OrchestratorState};
use queue::QueueBook;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Signals that wake the control loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoopSignal {
    /// A new item is pending
    Submitted,
    /// A running item finished and released its slot
    Finished,
    /// The orchestrator state changed
    StateChanged,
}

/// Queue bookkeeping and control-loop coordination
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Ordered items plus cancel tokens of running ones; never held across an await
    pub(crate) book: Arc<std::sync::Mutex<QueueBook>>,
    /// Orchestrator state, stored as [`OrchestratorState::to_u8`]
    pub(crate) state: Arc<AtomicU8>,
    /// Semaphore limiting concurrently running items (max_concurrent_downloads)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Wakes the control loop
    pub(crate) signal_tx: tokio::sync::mpsc::UnboundedSender<LoopSignal>,
    /// Held by the running control loop for its whole life, so at most one runs
    pub(crate) signal_rx:
        Arc<tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<LoopSignal>>>,
    /// Flag to indicate whether new submissions are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Next ticket number
    pub(crate) next_id: Arc<AtomicU64>,
    /// Parent of every fetch's cancel token; cancelled on shutdown
    pub(crate) shutdown: CancellationToken,
}

impl QueueState {
    fn new(max_concurrent: usize) -> Self {
        let (signal_tx, signal_rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            book: Arc::new(std::sync::Mutex::new(QueueBook::default())),
            state: Arc::new(AtomicU8::new(OrchestratorState::Idle.to_u8())),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
            signal_tx,
            signal_rx: Arc::new(tokio::sync::Mutex::new(signal_rx)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Routing and execution components shared by every fetch
#[derive(Clone)]
pub(crate) struct FetchPipeline {
    pub(crate) registry: Arc<ConfidenceRegistry>,
    pub(crate) resolver: Arc<Resolver>,
    pub(crate) tools: Arc<ToolSet>,
    pub(crate) executor: FetchExecutor,
    pub(crate) staging: StagingGate,
    pub(crate) safety: Arc<dyn SafetyPolicy>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct RoutedDownloader {
    /// Database holding the confidence registry and fetch history
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Routing, staging and execution
    pub(crate) pipeline: FetchPipeline,
    /// Queue and control-loop state
    pub(crate) queue_state: QueueState,
}

impl RoutedDownloader {
    /// Create a new RoutedDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the download, staging and quarantine directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Seeds the known-origin table (insert-or-ignore) when enabled
    /// - Detects the installed fetcher executables
    ///
    /// The orchestrator starts `Idle`; call [`start`](Self::start) to begin
    /// dispatching.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let tools = ToolSet::detect(&config.tools);
        Self::from_parts(config, tools, Arc::new(ProcessFetcher)).await
    }

    pub(crate) async fn from_parts(
        config: Config,
        tools: ToolSet,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        for (dir, name) in [
            (&config.download.download_dir, "download"),
            (&config.download.staging_dir, "staging"),
            (&config.download.quarantine_dir, "quarantine"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", name, dir.display(), e),
                ))
            })?;
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let registry = Arc::new(ConfidenceRegistry::new(Arc::clone(&db)));

        if config.routing.seed_known_origins {
            let inserted = registry.seed(KNOWN_ORIGINS).await?;
            tracing::info!(inserted, known = KNOWN_ORIGINS.len(), "seeded known origins");
        }

        let tools = Arc::new(tools);
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&registry),
            Arc::clone(&tools),
            &config.routing,
        ));
        let executor = FetchExecutor::new(
            fetcher,
            ExecutionLimits {
                timeout: config.download.fetch_timeout,
                kill_grace: config.download.kill_grace_period,
            },
        );
        let staging = StagingGate::new(
            &config.download.staging_dir,
            &config.download.quarantine_dir,
            config.retry.clone(),
        );

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let queue_state = QueueState::new(config.download.max_concurrent_downloads);

        tracing::info!(
            available = ?tools.available(),
            max_concurrent = config.download.max_concurrent_downloads,
            sandbox = config.download.sandbox_enabled,
            "downloader initialized"
        );

        Ok(Self {
            db,
            event_tx,
            config: Arc::new(config),
            pipeline: FetchPipeline {
                registry,
                resolver,
                tools,
                executor,
                staging,
                safety: Arc::new(AllowAll),
            },
            queue_state,
        })
    }

    /// Replace the safety gate consulted before every fetch
    ///
    /// ```no_run
    /// # use routed_dl::{RoutedDownloader, Config};
    /// # async fn example() -> routed_dl::Result<()> {
    /// let downloader = RoutedDownloader::new(Config::default())
    ///     .await?
    ///     .with_safety_policy(|url: &str| !url.contains("blocked.example"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_safety_policy(mut self, policy: impl SafetyPolicy + 'static) -> Self {
        self.pipeline.safety = Arc::new(policy);
        self
    }

    /// Subscribe to fetch events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// If a subscriber falls behind by more than 1000 events, it will receive a
    /// `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The confidence registry shared by every fetch
    pub fn registry(&self) -> Arc<ConfidenceRegistry> {
        Arc::clone(&self.pipeline.registry)
    }

    /// Detected fetcher executables
    pub fn tools(&self) -> Arc<ToolSet> {
        Arc::clone(&self.pipeline.tools)
    }

    /// Current orchestrator state
    pub fn state(&self) -> OrchestratorState {
        OrchestratorState::from_u8(self.queue_state.state.load(Ordering::SeqCst))
    }

    /// Settings shared by every command template
    pub(crate) fn command_settings(&self, quality: Option<&str>) -> CommandSettings {
        CommandSettings {
            quality: quality
                .unwrap_or(self.config.download.default_quality.as_str())
                .to_string(),
            timeout: self.config.download.fetch_timeout,
            user_agent: self.config.download.user_agent.clone(),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn signal(&self, signal: LoopSignal) {
        // Fails only when no loop receiver exists, which never happens while self lives
        self.queue_state.signal_tx.send(signal).ok();
    }
}
