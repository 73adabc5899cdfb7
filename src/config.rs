//! Configuration types for routed-dl

use crate::types::ExecutableKind;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Fetch behavior configuration (directories, concurrency, process supervision)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination directory used when a fetch names none (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch area fetchers write into before promotion (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Where files that could not be moved or removed end up (default: "./quarantine")
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: PathBuf,

    /// Route fetcher output through the staging area (default: true)
    ///
    /// When disabled, fetchers write straight into the destination directory.
    #[serde(default = "default_true")]
    pub sandbox_enabled: bool,

    /// Maximum concurrently running fetches (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Wall-clock deadline per fetcher process (default: 300 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Time a terminated process gets to exit before it is killed (default: 5 seconds)
    #[serde(default = "default_kill_grace_period", with = "duration_serde")]
    pub kill_grace_period: Duration,

    /// User-Agent passed to every fetcher
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Quality used when a fetch names none (default: "best")
    #[serde(default = "default_quality")]
    pub default_quality: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            staging_dir: default_staging_dir(),
            quarantine_dir: default_quarantine_dir(),
            sandbox_enabled: true,
            max_concurrent_downloads: default_max_concurrent(),
            fetch_timeout: default_fetch_timeout(),
            kill_grace_period: default_kill_grace_period(),
            user_agent: default_user_agent(),
            default_quality: default_quality(),
        }
    }
}

/// External fetcher locations
///
/// Each path is optional; unset kinds are searched on `PATH` and then in `tools_dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the video extractor (auto-detected if None)
    #[serde(default)]
    pub video_extractor_path: Option<PathBuf>,

    /// Path to the gallery extractor (auto-detected if None)
    #[serde(default)]
    pub gallery_extractor_path: Option<PathBuf>,

    /// Path to the generic HTTP fetcher (auto-detected if None)
    #[serde(default)]
    pub http_fetcher_path: Option<PathBuf>,

    /// Path to the transfer client (auto-detected if None)
    #[serde(default)]
    pub transfer_client_path: Option<PathBuf>,

    /// Whether to search PATH for executables if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Local directory checked last for bundled executables (default: "./tools")
    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,
}

impl ToolsConfig {
    /// Explicitly configured path for a kind, if any
    pub fn explicit_path(&self, kind: ExecutableKind) -> Option<&PathBuf> {
        match kind {
            ExecutableKind::VideoExtractor => self.video_extractor_path.as_ref(),
            ExecutableKind::GalleryExtractor => self.gallery_extractor_path.as_ref(),
            ExecutableKind::HttpFetcher => self.http_fetcher_path.as_ref(),
            ExecutableKind::TransferClient => self.transfer_client_path.as_ref(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            video_extractor_path: None,
            gallery_extractor_path: None,
            http_fetcher_path: None,
            transfer_client_path: None,
            search_path: true,
            tools_dir: default_tools_dir(),
        }
    }
}

/// Extra origin-fragment rule for the resolver's fallback table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallbackRule {
    /// Substring matched against the origin key
    pub fragment: String,
    /// Executable used when the fragment matches
    pub executable: ExecutableKind,
}

/// Routing policy configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Rules consulted before the built-in fallback table, in order
    #[serde(default)]
    pub extra_fallback_rules: Vec<FallbackRule>,

    /// Executable used when nothing else matches (default: video extractor)
    #[serde(default = "default_executable")]
    pub default_executable: ExecutableKind,

    /// Insert the built-in known-origin table on start-up (default: true)
    #[serde(default = "default_true")]
    pub seed_known_origins: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            extra_fallback_rules: vec![],
            default_executable: default_executable(),
            seed_known_origins: true,
        }
    }
}

/// Registry storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./routed-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Days of fetch history kept by `cleanup_history` (default: 30)
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            history_retention_days: default_history_retention_days(),
        }
    }
}

/// Retry configuration for transient staging failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 100 milliseconds)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 2000 milliseconds)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for RoutedDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig): directories, concurrency, process supervision
/// - [`tools`](ToolsConfig): fetcher executable locations
/// - [`routing`](RoutingConfig): fallback rules and seeding
/// - [`persistence`](PersistenceConfig): registry database and history retention
/// - [`retry`](RetryConfig): backoff for staging moves
///
/// Loading from disk is left to the caller; every field has a serde default, so
/// an empty JSON object deserializes to [`Config::default`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Fetcher executable locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Routing policy
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Registry storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Staging retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Staging directory
    pub fn staging_dir(&self) -> &PathBuf {
        &self.download.staging_dir
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(crate::Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.download.fetch_timeout.is_zero() {
            return Err(crate::Error::Config {
                message: "fetch_timeout must be greater than zero".to_string(),
                key: Some("fetch_timeout".to_string()),
            });
        }
        if self.download.staging_dir == self.download.quarantine_dir {
            return Err(crate::Error::Config {
                message: "staging_dir and quarantine_dir must differ".to_string(),
                key: Some("quarantine_dir".to_string()),
            });
        }
        if let Some(rule) = self
            .routing
            .extra_fallback_rules
            .iter()
            .find(|r| r.fragment.trim().is_empty())
        {
            return Err(crate::Error::Config {
                message: format!("fallback rule for {} has an empty fragment", rule.executable),
                key: Some("extra_fallback_rules".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("./quarantine")
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("./tools")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./routed-dl.db")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_kill_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_executable() -> ExecutableKind {
    ExecutableKind::VideoExtractor
}

fn default_history_retention_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond variant for the short staging retry delays
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
