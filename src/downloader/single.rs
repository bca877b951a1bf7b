//! Single-request orchestration and the retry boundary.
//!
//! One attempt runs the full sequence: resolve URL → ensure directory →
//! fetch profile → initiate transfer → await completion (detached transfers
//! only) → resolve filename collisions and rename → write metadata. The
//! session acquired by the initiator is released unconditionally when the
//! attempt ends. Retries re-run the entire sequence; nothing from a failed
//! attempt is reused.

use crate::completion::CompletionWatcher;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::initiator::{Initiated, InitiationTarget};
use crate::retry::download_with_retry;
use crate::types::{DownloadRequest, DownloadResult, GameRecord};
use crate::utils::{ensure_dir, metadata_path, unique_path};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ItchDownloader;

impl ItchDownloader {
    /// Download one game
    ///
    /// Never returns an error: every failure is captured in the result. On
    /// failure, the result of the final attempt is returned; invalid
    /// requests fail fast without retrying.
    pub async fn download(&self, request: &DownloadRequest) -> DownloadResult {
        let url = match request.resolved_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Rejecting request before dispatch");
                return DownloadResult::from_error(&e);
            }
        };

        let retry_config = self.retry_config_for(request);
        let outcome =
            download_with_retry(&retry_config, || self.run_attempt(request, &url)).await;

        match outcome {
            Ok(result) => result,
            Err(e) => DownloadResult::from_error(&e),
        }
    }

    /// Retry configuration for one request, with per-request overrides applied
    fn retry_config_for(&self, request: &DownloadRequest) -> RetryConfig {
        let mut config = self.config.retry.clone();
        if let Some(retries) = request.retries {
            config.max_retries = retries;
        }
        if let Some(delay) = request.retry_delay {
            config.base_delay = delay;
        }
        config
    }

    /// Run one full attempt of the download sequence
    async fn run_attempt(&self, request: &DownloadRequest, url: &str) -> Result<DownloadResult> {
        // In-memory requests without an explicit directory skip the disk
        // entirely; everything else falls back to the configured directory
        let dir: Option<PathBuf> = match (&request.download_dir, request.in_memory) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => None,
            (None, false) => Some(self.config.download_dir.clone()),
        };

        if let Some(dir) = &dir {
            ensure_dir(dir).await?;
        }

        let record = self.profile_fetcher.fetch(url).await?;
        debug!(url = url, game = %record.display_name(), "Game profile fetched");

        // Snapshot the directory before the transfer can create anything,
        // so a marker our own download writes is never in the ignored set
        let watcher = match &dir {
            Some(dir) => Some(CompletionWatcher::new(
                dir,
                self.config.completion.clone(),
            )?),
            None => None,
        };

        let target = InitiationTarget {
            game_url: url,
            record: &record,
            dir: dir.as_deref(),
            in_memory: request.in_memory,
            api_key: request
                .api_key
                .as_deref()
                .or(self.config.api_key.as_deref()),
            on_progress: request.on_progress.as_ref(),
        };

        let initiation = self.initiator.start(&target).await?;

        // Register the session before anything else can fail, so cleanup
        // runs no matter how the rest of the attempt ends
        let session_id = match initiation.session {
            Some(session) => Some(self.sessions.register(session).await),
            None => None,
        };

        let outcome = self
            .finish_attempt(request, &record, dir.as_deref(), watcher, initiation.outcome)
            .await;

        if let Some(id) = session_id {
            self.sessions.release(id).await;
        }

        outcome
    }

    /// Everything after initiation: completion wait, rename, metadata
    async fn finish_attempt(
        &self,
        request: &DownloadRequest,
        record: &GameRecord,
        dir: Option<&Path>,
        watcher: Option<CompletionWatcher>,
        initiated: Initiated,
    ) -> Result<DownloadResult> {
        let (downloaded, file_buffer) = match initiated {
            Initiated::Direct { path, bytes, .. } => (path, bytes),
            Initiated::Detached => {
                let dir = dir.ok_or_else(|| Error::Initiation {
                    message: "detached transfer requires a target directory".to_string(),
                    http_status: None,
                })?;
                let watcher = watcher.ok_or_else(|| {
                    Error::Watch("no watcher available for detached transfer".to_string())
                })?;

                let timeout = self.config.completion.timeout;
                let path = watcher.wait().await?.ok_or(Error::CompletionTimeout {
                    dir: dir.to_path_buf(),
                    waited: timeout,
                })?;
                (Some(path), None)
            }
        };

        let file_path = match (&downloaded, dir) {
            (Some(path), Some(dir)) => Some(self.finalize_file(request, dir, path).await?),
            _ => downloaded,
        };

        let metadata_file = match dir {
            Some(dir) if request.write_metadata.unwrap_or(self.config.write_metadata) => {
                Some(self.write_metadata_file(record, dir, file_path.as_deref()).await?)
            }
            _ => None,
        };

        info!(
            game = %record.display_name(),
            path = ?file_path,
            "Download and file operations successful"
        );

        Ok(DownloadResult {
            success: true,
            message: "Download and file operations successful.".to_string(),
            file_path,
            file_buffer,
            metadata_path: metadata_file,
            record: Some(record.clone()),
            http_status: None,
        })
    }

    /// Resolve the final name for a downloaded artifact and rename if needed
    ///
    /// The desired name (when given) or the artifact's own stem is the
    /// candidate; a numeric suffix is appended before the extension until no
    /// other file occupies the name. Failures preserve the downloaded path.
    async fn finalize_file(
        &self,
        request: &DownloadRequest,
        dir: &Path,
        downloaded: &Path,
    ) -> Result<PathBuf> {
        let stem = match &request.desired_file_name {
            Some(name) => name.clone(),
            None => downloaded
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("download")
                .to_string(),
        };
        let extension = downloaded.extension().and_then(|e| e.to_str());

        // The artifact itself is not a collision; only rename when the
        // resolved name differs
        let candidate = match extension {
            Some(ext) => dir.join(format!("{}.{}", stem, ext)),
            None => dir.join(&stem),
        };
        if candidate == downloaded {
            return Ok(downloaded.to_path_buf());
        }

        let target = unique_path(dir, &stem, extension)?;
        tokio::fs::rename(downloaded, &target)
            .await
            .map_err(|e| Error::Finalize {
                message: format!(
                    "failed to rename {} to {}: {}",
                    downloaded.display(),
                    target.display(),
                    e
                ),
                downloaded: downloaded.to_path_buf(),
            })?;

        debug!(from = %downloaded.display(), to = %target.display(), "Renamed artifact");
        Ok(target)
    }

    /// Persist the metadata record next to the artifact
    async fn write_metadata_file(
        &self,
        record: &GameRecord,
        dir: &Path,
        downloaded: Option<&Path>,
    ) -> Result<PathBuf> {
        let path = metadata_path(dir, &record.display_name());
        let finalize = |message: String| Error::Finalize {
            message,
            downloaded: downloaded.unwrap_or(dir).to_path_buf(),
        };

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| finalize(format!("failed to serialize metadata: {}", e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| finalize(format!("failed to write {}: {}", path.display(), e)))?;

        Ok(path)
    }
}
