//! # itch-dl
//!
//! Download orchestration library for itch.io game builds.
//!
//! ## Design Philosophy
//!
//! itch-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Pluggable at the seams** - Profile fetching and transfer initiation
//!   are traits, so browser automation or alternative backends drop in
//! - **Failure-capturing** - A download never panics or propagates an error;
//!   every request yields a [`DownloadResult`], success or not
//!
//! ## Quick Start
//!
//! ```no_run
//! use itch_dl::{Config, DownloadRequest, ItchDownloader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         download_dir: "./downloads".into(),
//!         api_key: Some("my-api-key".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let downloader = Arc::new(ItchDownloader::new(config)?);
//!
//!     // One game by name and author
//!     let result = downloader
//!         .download(&DownloadRequest::from_name_author("My Game", "author"))
//!         .await;
//!     println!("{}: {}", result.success, result.message);
//!
//!     // A batch, at most 3 at a time, results in request order
//!     let requests = vec![
//!         DownloadRequest::from_url("https://author.itch.io/first"),
//!         DownloadRequest::from_url("https://author.itch.io/second"),
//!     ];
//!     let results = downloader.download_batch(requests, Some(3)).await;
//!     assert_eq!(results.len(), 2);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Collection listing
pub mod collection;
/// Download completion detection from filesystem events
pub mod completion;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Download initiation collaborators
pub mod initiator;
/// Game metadata profile fetching
pub mod profile;
/// Retry logic with exponential backoff
pub mod retry;
/// Externally-acquired session tracking
pub mod session;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use collection::CollectionClient;
pub use completion::CompletionWatcher;
pub use config::{CompletionConfig, Config, RetryConfig};
pub use downloader::ItchDownloader;
pub use error::{Error, Result};
pub use initiator::{ApiInitiator, DownloadInitiator, Initiated, Initiation, InitiationTarget};
pub use profile::{HttpProfileFetcher, ProfileFetcher};
pub use session::{DownloadSession, SessionRegistry};
pub use types::{
    DownloadProgress, DownloadRequest, DownloadResult, GameAuthor, GameRecord, ProgressCallback,
};

use std::sync::Arc;

/// Wait for a termination signal, then release every registered session.
///
/// Best-effort cleanup of externally-acquired resources (browser instances)
/// before exit; it does not cancel in-flight downloads.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use itch_dl::{Config, ItchDownloader, release_sessions_on_signal};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = Arc::new(ItchDownloader::new(Config::default())?);
///
///     // Clean up sessions if the process is interrupted
///     tokio::spawn(release_sessions_on_signal(downloader.sessions()));
///
///     Ok(())
/// }
/// ```
pub async fn release_sessions_on_signal(sessions: Arc<SessionRegistry>) {
    wait_for_signal().await;
    sessions.release_all().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
