//! Core types for routed-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Reserved progress value meaning "active, but percentage unknown"
pub const INDETERMINATE_PROGRESS: i32 = -1;

/// Ticket identifying a submitted fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl TicketId {
    /// Create a new TicketId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TicketId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TicketId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// The closed set of external fetcher programs
///
/// Adding a fetcher means adding a variant here plus one entry in the
/// command template table ([`crate::command`]) and one progress rule
/// ([`crate::executor`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutableKind {
    /// Video/audio extractor (`yt-dlp`)
    #[serde(rename = "yt-dlp")]
    VideoExtractor,
    /// Image gallery extractor (`gallery-dl`)
    #[serde(rename = "gallery-dl")]
    GalleryExtractor,
    /// Generic recursive HTTP fetcher (`wget`)
    #[serde(rename = "wget")]
    HttpFetcher,
    /// Single-resource transfer client (`curl`)
    #[serde(rename = "curl")]
    TransferClient,
}

impl ExecutableKind {
    /// Every known kind, in detection order
    pub const ALL: [ExecutableKind; 4] = [
        ExecutableKind::VideoExtractor,
        ExecutableKind::GalleryExtractor,
        ExecutableKind::HttpFetcher,
        ExecutableKind::TransferClient,
    ];

    /// Name of the program on disk (without platform extension)
    pub fn binary_name(&self) -> &'static str {
        match self {
            ExecutableKind::VideoExtractor => "yt-dlp",
            ExecutableKind::GalleryExtractor => "gallery-dl",
            ExecutableKind::HttpFetcher => "wget",
            ExecutableKind::TransferClient => "curl",
        }
    }
}

impl std::fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

impl std::str::FromStr for ExecutableKind {
    type Err = Error;

    /// Parse a stored or caller-supplied executable name
    ///
    /// Fails with [`Error::UnsupportedExecutable`] for anything outside the fixed registry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ExecutableKind::ALL
            .into_iter()
            .find(|kind| kind.binary_name() == name)
            .ok_or_else(|| Error::UnsupportedExecutable(s.to_string()))
    }
}

/// Content category of an origin
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Video hosting
    Video,
    /// Music and audio
    Audio,
    /// Galleries and boorus
    Gallery,
    /// Image hosting
    Images,
    /// Social networks
    Social,
    /// File sharing hosts
    Filehost,
    /// Live streaming
    Streaming,
    /// Adult content
    Adult,
    /// Not classified
    #[default]
    Unknown,
}

impl Category {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Gallery => "gallery",
            Category::Images => "images",
            Category::Social => "social",
            Category::Filehost => "filehost",
            Category::Streaming => "streaming",
            Category::Adult => "adult",
            Category::Unknown => "unknown",
        }
    }

    /// Parse the database representation, defaulting to `Unknown`
    pub fn from_db(value: &str) -> Self {
        match value {
            "video" => Category::Video,
            "audio" => Category::Audio,
            "gallery" => Category::Gallery,
            "images" => Category::Images,
            "social" => Category::Social,
            "filehost" => Category::Filehost,
            "streaming" => Category::Streaming,
            "adult" => Category::Adult,
            _ => Category::Unknown,
        }
    }
}

/// Learned routing record for one origin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginRecord {
    /// Normalized origin key (unique)
    pub origin: String,
    /// Preferred executable for this origin
    pub executable: ExecutableKind,
    /// Reliability estimate, clamped to [0.01, 0.99]
    pub confidence: f64,
    /// Observed successes
    pub success_count: u32,
    /// Observed failures
    pub failure_count: u32,
    /// Content category
    pub category: Category,
    /// When the record was last updated by an outcome or seed
    pub last_tested: DateTime<Utc>,
    /// Whether the origin serves sensitive content
    pub is_sensitive: bool,
}

/// One recorded fetch attempt (diagnostics only, never read back into routing)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique database ID
    pub id: i64,
    /// Origin key the fetch targeted
    pub origin: String,
    /// Short fingerprint of the full URL
    pub url_hash: Option<String>,
    /// Executable that ran
    pub executable: String,
    /// Whether the fetch succeeded
    pub success: bool,
    /// Wall-clock duration of the attempt
    pub duration: Duration,
    /// Number of files promoted to the destination
    pub files_produced: u64,
    /// Failure message, if any
    pub error_message: Option<String>,
    /// When the attempt finished
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate registry statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Number of known origins
    pub total_origins: u64,
    /// Mean confidence across all origins (0.0 when empty)
    pub average_confidence: f64,
    /// Sum of all success counters
    pub total_successes: u64,
    /// Sum of all failure counters
    pub total_failures: u64,
}

/// Which step of the fallback chain produced a resolution
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Caller forced an available executable
    Forced,
    /// Exact origin match in the confidence registry
    Registry {
        /// Confidence of the matched record
        confidence: f64,
    },
    /// Substring match in the fallback table
    FallbackTable,
    /// URL-pattern heuristic (watch/video or gallery/image indicators)
    Heuristic,
    /// Designated default executable
    Default,
}

/// Result of resolving a URL to an executable
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Chosen executable
    pub executable: ExecutableKind,
    /// Fallback step that chose it
    pub source: ResolutionSource,
}

/// Caller-supplied options for a fetch
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Destination directory (uses the configured download directory if None)
    #[serde(default)]
    pub target_dir: Option<PathBuf>,

    /// Quality selector in caller vocabulary ("best", "1080p", "FLAC", ...)
    #[serde(default)]
    pub quality: Option<String>,

    /// Explicit executable, honored when available on the host
    #[serde(default)]
    pub forced_executable: Option<ExecutableKind>,

    /// Override the configured sandbox setting for this fetch
    #[serde(default)]
    pub sandbox: Option<bool>,
}

/// Progress reported while a fetch runs
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// Numeric percentage (0-100)
    Percent(u8),
    /// Active, percentage unknown
    Indeterminate,
}

impl Progress {
    /// Build from a parsed percentage, clamping to 0-100
    pub fn from_percent(value: f64) -> Self {
        Progress::Percent(value.clamp(0.0, 100.0) as u8)
    }

    /// Integer wire form: 0-100, or [`INDETERMINATE_PROGRESS`]
    pub fn as_i32(&self) -> i32 {
        match self {
            Progress::Percent(p) => i32::from(*p),
            Progress::Indeterminate => INDETERMINATE_PROGRESS,
        }
    }
}

/// Payload of the caller's progress callback
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// False only for the terminal report of a failed fetch
    pub success: bool,
    /// Human-readable status line
    pub message: String,
    /// 0-100, or [`INDETERMINATE_PROGRESS`]
    pub percent: i32,
}

impl ProgressUpdate {
    /// Non-terminal progress report
    pub fn running(message: impl Into<String>, progress: Progress) -> Self {
        Self {
            success: true,
            message: message.into(),
            percent: progress.as_i32(),
        }
    }
}

/// Why a fetch failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The safety gate rejected the URL
    BlockedByPolicy,
    /// The URL could not be parsed
    InvalidUrl,
    /// Unknown executable kind
    UnsupportedExecutable,
    /// The resolved executable is not installed
    ExecutableUnavailable,
    /// The process exceeded its deadline
    Timeout,
    /// The process exited unsuccessfully
    NonZeroExit {
        /// Exit code, if any
        code: Option<i32>,
    },
    /// Cancelled by the caller
    Cancelled,
    /// Scratch area could not be prepared
    Staging,
}

/// Terminal result of supervising one fetcher process
#[must_use]
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    /// Exit code 0 and no timeout/cancellation
    pub success: bool,
    /// Short human-readable summary
    pub message: String,
    /// Failure classification (None on success)
    pub failure: Option<FailureKind>,
    /// Wall-clock time the process ran
    pub duration: Duration,
    /// Last numeric percentage seen, if any
    pub last_percent: Option<u8>,
}

/// Terminal result of the full fetch pipeline
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Whether the fetch succeeded
    pub success: bool,
    /// Short human-readable message
    pub message: String,
    /// Failure classification (None on success)
    pub failure: Option<FailureKind>,
    /// Executable that ran, if resolution got that far
    pub executable: Option<ExecutableKind>,
    /// Files now present in the destination
    pub files: Vec<PathBuf>,
    /// Non-fatal promotion problems (collisions, quarantined files)
    pub warnings: Vec<String>,
}

impl FetchOutcome {
    /// Failure outcome without executable or files
    pub fn failed(message: impl Into<String>, failure: FailureKind) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(failure),
            executable: None,
            files: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Per-item queue status (strictly forward)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting to be dispatched
    Pending,
    /// Dispatched to the fetch pipeline
    Running,
    /// Finished successfully
    Done,
    /// Finished unsuccessfully
    Failed,
}

impl ItemStatus {
    /// Whether the item reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed)
    }
}

/// Global orchestrator state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Never started
    Idle,
    /// Dispatching pending items
    Active,
    /// Not dispatching; running items continue
    Paused,
    /// Stopped; running items allowed to finish
    Stopped,
}

impl QueueState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            QueueState::Idle => 0,
            QueueState::Active => 1,
            QueueState::Paused => 2,
            QueueState::Stopped => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => QueueState::Active,
            2 => QueueState::Paused,
            3 => QueueState::Stopped,
            _ => QueueState::Idle,
        }
    }
}

/// Snapshot of one queue item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItem {
    /// Ticket returned by `submit`
    pub id: TicketId,
    /// Submitted URL
    pub url: String,
    /// Submitted options
    pub options: FetchOptions,
    /// Current status
    pub status: ItemStatus,
    /// 0-100, or [`INDETERMINATE_PROGRESS`]
    pub progress_percent: i32,
    /// Executable chosen by the resolver, once dispatched
    pub assigned_executable: Option<ExecutableKind>,
    /// Terminal message, once finished
    pub message: Option<String>,
    /// Submission time
    pub submitted_at: DateTime<Utc>,
}

/// Running fetch counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Executor invocations attempted
    pub total: u64,
    /// Invocations that succeeded
    pub succeeded: u64,
    /// Invocations that failed
    pub failed: u64,
}

/// Event emitted during the fetch lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item added to the queue
    Queued {
        /// Ticket
        id: TicketId,
        /// Submitted URL
        url: String,
    },

    /// Item removed from the queue before running
    Removed {
        /// Ticket
        id: TicketId,
    },

    /// Item dispatched and executable chosen
    Started {
        /// Ticket
        id: TicketId,
        /// Resolved executable
        executable: ExecutableKind,
    },

    /// Progress report from the running executable
    Progress {
        /// Ticket
        id: TicketId,
        /// 0-100, or [`INDETERMINATE_PROGRESS`]
        percent: i32,
        /// Output line that produced the report
        message: String,
    },

    /// Item finished successfully
    Completed {
        /// Ticket
        id: TicketId,
        /// Executable that ran
        executable: ExecutableKind,
        /// Files promoted to the destination
        files: Vec<PathBuf>,
    },

    /// Item finished unsuccessfully
    Failed {
        /// Ticket
        id: TicketId,
        /// Short human-readable message
        error: String,
        /// Failure classification
        failure: FailureKind,
    },

    /// A staged file could not be removed or moved and was relocated
    Quarantined {
        /// Ticket whose fetch produced the file
        id: TicketId,
        /// New location inside the quarantine directory
        path: PathBuf,
        /// Why it was quarantined
        reason: String,
    },

    /// Orchestrator state changed (start/pause/resume/stop)
    QueueStateChanged {
        /// New state
        state: QueueState,
    },

    /// Orchestrator shut down
    Shutdown,
}
