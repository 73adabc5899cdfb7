//! Error types for routed-dl
//!
//! This module provides the error taxonomy of the fetch pipeline:
//! - Routing errors (malformed URL, unknown executable kind, executable missing on host)
//! - Execution errors (timeout, non-zero exit, cancellation, spawn failure)
//! - Storage errors for the confidence registry (recovered locally, never surfaced as fetch failures)
//! - Staging errors (collisions and move failures during promotion)
//!
//! Every variant has a stable machine-readable code via [`Error::code`] so outer
//! layers can react without parsing messages.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::FailureKind;

/// Result type alias for routed-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for routed-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The locator has no parsable authority component
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Executable name is not one of the fixed known kinds
    #[error("unsupported executable: {0}")]
    UnsupportedExecutable(String),

    /// Resolved executable is not installed on this host
    #[error("executable unavailable: {0}")]
    ExecutableUnavailable(String),

    /// Child process execution failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Staging or promotion failure
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "staging_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue item not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new fetches")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Errors raised while supervising a fetcher process
#[derive(Debug, Error)]
pub enum FetchError {
    /// The child process exceeded its wall-clock deadline and was terminated
    #[error("timed out after {}s", after.as_secs())]
    Timeout {
        /// The deadline that was exceeded
        after: Duration,
    },

    /// The child process exited with a failure status
    #[error("exited with code {}: {excerpt}", code.map_or_else(|| "?".to_string(), |c| c.to_string()))]
    NonZeroExit {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Truncated excerpt of the last error line
        excerpt: String,
    },

    /// The fetch was cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// The process could not be started
    #[error("failed to start {program}: {reason}")]
    Spawn {
        /// Program that failed to start
        program: PathBuf,
        /// Underlying reason
        reason: String,
    },
}

impl FetchError {
    /// Classify this error for reporting in a [`crate::types::FetchOutcome`]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::NonZeroExit { code, .. } => FailureKind::NonZeroExit { code: *code },
            FetchError::Cancelled => FailureKind::Cancelled,
            FetchError::Spawn { .. } => FailureKind::ExecutableUnavailable,
        }
    }
}

/// Staging and promotion errors
#[derive(Debug, Error)]
pub enum StagingError {
    /// A file with the same name already exists at the destination
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The destination path that is already occupied
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Invalid path encountered during staging
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "invalid_url",
            Error::UnsupportedExecutable(_) => "unsupported_executable",
            Error::ExecutableUnavailable(_) => "executable_unavailable",
            Error::Fetch(e) => match e {
                FetchError::Timeout { .. } => "timeout",
                FetchError::NonZeroExit { .. } => "non_zero_exit",
                FetchError::Cancelled => "cancelled",
                FetchError::Spawn { .. } => "spawn_failed",
            },
            Error::Database(_) | Error::Sqlx(_) => "storage_failure",
            Error::Staging(e) => match e {
                StagingError::FileCollision { .. } => "file_collision",
                StagingError::MoveFailed { .. } => "move_failed",
                StagingError::InvalidPath { .. } => "invalid_path",
            },
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error belongs to the registry storage layer
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Sqlx(_))
    }
}
