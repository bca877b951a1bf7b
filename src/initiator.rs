//! Download initiation collaborators
//!
//! The [`DownloadInitiator`] trait is the seam between the orchestration core
//! and whatever actually starts a transfer. Two families of implementation
//! exist in practice:
//!
//! - **Detached** initiators (browser automation): they trigger a download
//!   that lands in the target directory on its own schedule; the core then
//!   observes completion through the
//!   [`CompletionWatcher`](crate::completion::CompletionWatcher).
//! - **Direct** initiators: they perform the whole transfer themselves and
//!   hand back the finished file or byte buffer. [`ApiInitiator`] is the
//!   built-in direct implementation using the authenticated itch.io API.
//!
//! Progress events from a direct transfer are forwarded verbatim to the
//! request's progress callback, one event per received chunk.

use crate::error::{Error, Result};
use crate::session::DownloadSession;
use crate::types::{DownloadProgress, GameRecord, ProgressCallback};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Timeout for API metadata calls (not the transfer itself)
const API_CALL_TIMEOUT_SECS: u64 = 30;

/// Default itch.io API endpoint
const DEFAULT_API_BASE: &str = "https://api.itch.io";

/// Everything an initiator needs to start one transfer
pub struct InitiationTarget<'a> {
    /// Resolved game page URL
    pub game_url: &'a str,
    /// Metadata record fetched for the game
    pub record: &'a GameRecord,
    /// Target directory; `None` only in pure in-memory mode
    pub dir: Option<&'a Path>,
    /// Keep the downloaded bytes in memory
    pub in_memory: bool,
    /// API key for authenticated transfers
    pub api_key: Option<&'a str>,
    /// Caller-supplied progress callback
    pub on_progress: Option<&'a ProgressCallback>,
}

/// How the initiated transfer proceeds
#[derive(Debug)]
pub enum Initiated {
    /// The transfer runs externally and lands in the target directory; the
    /// caller must watch for completion
    Detached,
    /// The initiator performed the transfer itself
    Direct {
        /// Path of the written file, when a directory was given
        path: Option<PathBuf>,
        /// Downloaded bytes, when in-memory mode was requested
        bytes: Option<Vec<u8>>,
        /// Name of the transferred file
        file_name: String,
    },
}

/// Result of starting a transfer
pub struct Initiation {
    /// How the transfer proceeds from here
    pub outcome: Initiated,
    /// Resource requiring explicit release when the attempt ends, if the
    /// initiator acquired one (a browser instance, typically)
    pub session: Option<Arc<dyn DownloadSession>>,
}

impl std::fmt::Debug for Initiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiation")
            .field("outcome", &self.outcome)
            .field("session", &self.session.as_ref().map(|_| "<DownloadSession>"))
            .finish()
    }
}

/// Starts one transfer toward its destination
#[async_trait]
pub trait DownloadInitiator: Send + Sync {
    /// Begin the transfer described by `target`
    async fn start(&self, target: &InitiationTarget<'_>) -> Result<Initiation>;
}

#[derive(Debug, Deserialize)]
struct UploadsResponse {
    #[serde(default)]
    uploads: Vec<Upload>,
}

#[derive(Debug, Deserialize)]
struct Upload {
    id: u64,
    filename: Option<String>,
}

/// Direct transfer through the authenticated itch.io API
///
/// Lists the game's uploads, picks the first, and streams it to disk or into
/// memory, emitting one progress event per received chunk.
pub struct ApiInitiator {
    client: reqwest::Client,
    base_url: String,
}

impl ApiInitiator {
    /// Create an initiator against the public itch.io API
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Create an initiator against a custom API endpoint
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(API_CALL_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Build an authenticated API URL
    fn api_url(&self, endpoint: &str, api_key: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, endpoint)).map_err(|e| {
            Error::Initiation {
                message: format!("invalid API URL for {}: {}", endpoint, e),
                http_status: None,
            }
        })?;
        url.query_pairs_mut().append_pair("api_key", api_key);
        Ok(url)
    }

    /// Pick the first upload available for a game
    async fn first_upload(&self, game_id: u64, api_key: &str) -> Result<Upload> {
        let url = self.api_url(&format!("/games/{}/uploads", game_id), api_key)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Initiation {
                message: format!("upload listing returned {} for game {}", status, game_id),
                http_status: Some(status.as_u16()),
            });
        }

        let uploads: UploadsResponse = response.json().await.map_err(|e| Error::Initiation {
            message: format!("failed to parse uploads for game {}: {}", game_id, e),
            http_status: None,
        })?;

        uploads
            .uploads
            .into_iter()
            .next()
            .ok_or_else(|| Error::Initiation {
                message: format!("no uploads found for game {}", game_id),
                http_status: None,
            })
    }

    /// Stream one upload to its destination, forwarding progress events
    async fn transfer(
        &self,
        upload_id: u64,
        api_key: &str,
        file_name: &str,
        target: &InitiationTarget<'_>,
    ) -> Result<(Option<PathBuf>, Option<Vec<u8>>)> {
        let url = self.api_url(&format!("/uploads/{}/download", upload_id), api_key)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Initiation {
                message: format!("download of upload {} returned {}", upload_id, status),
                http_status: Some(status.as_u16()),
            });
        }

        let total_bytes = response.content_length();
        let path = target.dir.map(|dir| dir.join(file_name));

        let mut file = match &path {
            Some(path) if !target.in_memory => Some(tokio::fs::File::create(path).await?),
            _ => None,
        };
        let mut buffer: Option<Vec<u8>> = target.in_memory.then(Vec::new);

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            received += chunk.len() as u64;

            if let Some(file) = file.as_mut() {
                file.write_all(&chunk).await?;
            }
            if let Some(buffer) = buffer.as_mut() {
                buffer.extend_from_slice(&chunk);
            }

            if let Some(on_progress) = target.on_progress {
                on_progress(DownloadProgress {
                    bytes_received: received,
                    total_bytes,
                    file_name: Some(file_name.to_string()),
                });
            }
        }

        if let Some(mut file) = file {
            file.flush().await?;
        }

        // In-memory mode with a directory still persists the bytes
        if let (Some(path), Some(buffer)) = (&path, &buffer) {
            if target.in_memory {
                tokio::fs::write(path, buffer).await?;
            }
        }

        debug!(
            upload_id = upload_id,
            bytes = received,
            "API transfer finished"
        );
        Ok((path, buffer))
    }
}

#[async_trait]
impl DownloadInitiator for ApiInitiator {
    async fn start(&self, target: &InitiationTarget<'_>) -> Result<Initiation> {
        let api_key = target.api_key.ok_or_else(|| Error::Initiation {
            message: "API key is required for direct transfers".to_string(),
            http_status: None,
        })?;

        let game_id = target.record.id.ok_or_else(|| Error::Initiation {
            message: format!("no game id in profile for {}", target.game_url),
            http_status: None,
        })?;

        let upload = self.first_upload(game_id, api_key).await?;
        let file_name = upload
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}.zip", target.record.display_name()));

        info!(
            game_id = game_id,
            upload_id = upload.id,
            file = %file_name,
            "Starting API transfer"
        );

        let (path, bytes) = self
            .transfer(upload.id, api_key, &file_name, target)
            .await?;

        Ok(Initiation {
            outcome: Initiated::Direct {
                path,
                bytes,
                file_name,
            },
            session: None,
        })
    }
}
