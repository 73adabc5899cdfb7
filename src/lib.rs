//! # routed-dl
//!
//! Adaptive fetch orchestration for external fetcher executables.
//!
//! Given a URL, routed-dl picks which external program should fetch it
//! (`yt-dlp`, `gallery-dl`, `wget` or `curl`), runs that program as a
//! supervised child process with streamed progress, moves what it produced
//! into the destination through a staging area, and learns from the outcome
//! which program works best for each origin.
//!
//! ## Design Philosophy
//!
//! routed-dl is designed to be:
//! - **Learning** - A persistent confidence registry steers routing, with
//!   static fallback tables for origins it has never seen
//! - **Fail-open** - Registry outages degrade routing, never fetching
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use routed_dl::{Config, FetchOptions, RoutedDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = RoutedDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader
//!         .submit("https://video-host.example/watch?id=1", FetchOptions::default())
//!         .await?;
//!     downloader.start().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Command templates per executable
pub mod command;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Queue orchestrator and caller API (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Child process supervision and progress extraction
pub mod executor;
/// Origin key extraction
pub mod origin;
/// Learned origin → executable routing
pub mod registry;
/// URL → executable resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Scratch directories and file promotion
pub mod staging;
/// Host executable detection
pub mod tools;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FallbackRule};
pub use db::Database;
pub use downloader::{AllowAll, RoutedDownloader, SafetyPolicy};
pub use error::{DatabaseError, Error, FetchError, Result, StagingError};
pub use registry::ConfidenceRegistry;
pub use types::{
    Event, ExecutableKind, FailureKind, FetchOptions, FetchOutcome, FetchStats, ItemStatus,
    OriginRecord, Progress, ProgressUpdate, QueueItem, QueueState, RegistryStats, TicketId,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use routed_dl::{RoutedDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = RoutedDownloader::new(Config::default()).await?;
///     downloader.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: RoutedDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
