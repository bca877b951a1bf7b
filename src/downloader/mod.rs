//! Core downloader implementation split into focused submodules.
//!
//! The `ItchDownloader` struct and its methods are organized by concern:
//! - [`single`] - single-request orchestration and the retry boundary
//! - [`batch`] - bounded-pool and fully-parallel batch scheduling

mod batch;
mod single;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::collection::{CollectionClient, parse_collection_id};
use crate::config::Config;
use crate::error::Result;
use crate::initiator::{ApiInitiator, DownloadInitiator};
use crate::profile::{HttpProfileFetcher, ProfileFetcher};
use crate::session::SessionRegistry;
use crate::types::{DownloadRequest, DownloadResult};
use std::sync::Arc;
use tracing::info;

/// Orchestrates game downloads: profile resolution, transfer initiation,
/// completion detection, retry, and batch scheduling
///
/// The external collaborators (profile fetcher, download initiator) sit
/// behind traits so browser-automation or alternative API backends can be
/// plugged in without touching the orchestration.
pub struct ItchDownloader {
    /// Static configuration
    config: Config,

    /// Metadata profile collaborator
    profile_fetcher: Arc<dyn ProfileFetcher>,

    /// Transfer initiation collaborator
    initiator: Arc<dyn DownloadInitiator>,

    /// Sessions acquired by in-flight attempts, for interrupt cleanup
    sessions: Arc<SessionRegistry>,
}

impl ItchDownloader {
    /// Create a downloader with the default HTTP collaborators
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        let profile_fetcher = Arc::new(HttpProfileFetcher::new()?);
        let initiator = Arc::new(ApiInitiator::new()?);
        Ok(Self::with_collaborators(config, profile_fetcher, initiator))
    }

    /// Create a downloader with custom collaborators
    ///
    /// The seam for browser-automation initiators and for tests.
    pub fn with_collaborators(
        config: Config,
        profile_fetcher: Arc<dyn ProfileFetcher>,
        initiator: Arc<dyn DownloadInitiator>,
    ) -> Self {
        Self {
            config,
            profile_fetcher,
            initiator,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Registry of sessions held by in-flight attempts
    ///
    /// Hand this to [`release_sessions_on_signal`](crate::release_sessions_on_signal)
    /// or release it directly from a custom interrupt handler.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Release every session still held by in-flight attempts
    ///
    /// Best-effort cleanup before process exit; it does not cancel in-flight
    /// I/O.
    pub async fn shutdown(&self) {
        info!("Shutting down, releasing active sessions");
        self.sessions.release_all().await;
    }

    /// Download every game in an itch.io collection
    ///
    /// Pages through the collection, then runs the games as a batch with the
    /// configured concurrency.
    ///
    /// # Errors
    /// Returns an error when the collection itself cannot be listed;
    /// individual game failures are reported in their results.
    pub async fn download_collection(
        self: &Arc<Self>,
        collection_url: &str,
        concurrency: Option<usize>,
    ) -> Result<Vec<DownloadResult>> {
        let client = CollectionClient::new()?;
        self.download_collection_with(&client, collection_url, concurrency)
            .await
    }

    /// Download a collection through a specific [`CollectionClient`]
    ///
    /// # Errors
    /// Returns an error when the collection itself cannot be listed.
    pub async fn download_collection_with(
        self: &Arc<Self>,
        client: &CollectionClient,
        collection_url: &str,
        concurrency: Option<usize>,
    ) -> Result<Vec<DownloadResult>> {
        let collection_id = parse_collection_id(collection_url)?;
        let urls = client
            .game_urls(&collection_id, self.config.api_key.as_deref())
            .await?;

        info!(
            collection_id = %collection_id,
            games = urls.len(),
            "Downloading collection"
        );

        let requests = urls
            .into_iter()
            .map(|url| DownloadRequest {
                url: Some(url),
                api_key: self.config.api_key.clone(),
                ..Default::default()
            })
            .collect();

        Ok(self.download_batch(requests, concurrency).await)
    }
}
