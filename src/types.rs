//! Core types for itch-dl

use crate::error::{Error, Result};
use crate::utils::slugify;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Progress event emitted while a transfer is in flight
///
/// Events are forwarded verbatim from the download initiator to any
/// caller-supplied callback, without buffering or rate limiting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes received so far
    pub bytes_received: u64,
    /// Total size of the transfer, when the initiator knows it
    pub total_bytes: Option<u64>,
    /// Name of the file being transferred, when known
    pub file_name: Option<String>,
}

/// Caller-supplied progress callback
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Author entry in a game's metadata record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAuthor {
    /// Author profile URL
    pub url: String,
    /// Author display name
    pub name: String,
}

/// Descriptive metadata for one itch.io game
///
/// Assembled from the game page's `data.json` merged with the author/name
/// parts parsed out of the game URL. Persisted pretty-printed as
/// `{name}-metadata.json` next to the downloaded artifact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Game title as published
    #[serde(default)]
    pub title: Option<String>,
    /// Cover image URL
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Publishing authors
    #[serde(default)]
    pub authors: Vec<GameAuthor>,
    /// Tags assigned to the game
    #[serde(default)]
    pub tags: Vec<String>,
    /// Numeric itch.io game id
    #[serde(default)]
    pub id: Option<u64>,
    /// Comments feed link
    #[serde(default)]
    pub comments_link: Option<String>,
    /// Canonical self link
    #[serde(default)]
    pub self_link: Option<String>,
    /// Author segment of the game URL
    #[serde(default)]
    pub author: Option<String>,
    /// Name segment of the game URL
    #[serde(default)]
    pub name: Option<String>,
    /// Game page URL
    #[serde(default)]
    pub url: Option<String>,
    /// URL the metadata was fetched from
    #[serde(default)]
    pub metadata_url: Option<String>,
}

impl GameRecord {
    /// Best display name for this game, falling back through name, title, id
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.title.clone())
            .or_else(|| self.id.map(|id| id.to_string()))
            .unwrap_or_else(|| "game".to_string())
    }
}

/// One download request
///
/// Identifies a target either by direct URL or by a name+author pair from
/// which a canonical URL is derived. All other fields are optional overrides
/// of the [`Config`](crate::Config) defaults.
#[derive(Clone, Default)]
pub struct DownloadRequest {
    /// Game name, used with `author` to derive a URL when `url` is absent
    pub name: Option<String>,
    /// Game author, used with `name` to derive a URL when `url` is absent
    pub author: Option<String>,
    /// Direct game page URL; takes precedence over name+author derivation
    pub url: Option<String>,
    /// Rename the finished artifact to this stem (extension preserved)
    pub desired_file_name: Option<String>,
    /// Target directory; falls back to the configured download directory
    pub download_dir: Option<PathBuf>,
    /// itch.io API key for authenticated direct transfers
    pub api_key: Option<String>,
    /// Keep the downloaded bytes in memory instead of (or in addition to)
    /// writing them to disk
    pub in_memory: bool,
    /// Write the metadata JSON file (None = use the configured default)
    pub write_metadata: Option<bool>,
    /// Retry count override for this request
    pub retries: Option<u32>,
    /// Backoff base delay override for this request
    pub retry_delay: Option<Duration>,
    /// When part of a batch, opt this batch into unconstrained parallelism
    pub parallel: bool,
    /// Progress callback receiving transfer events verbatim
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("name", &self.name)
            .field("author", &self.author)
            .field("url", &self.url)
            .field("desired_file_name", &self.desired_file_name)
            .field("download_dir", &self.download_dir)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("in_memory", &self.in_memory)
            .field("write_metadata", &self.write_metadata)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("parallel", &self.parallel)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl DownloadRequest {
    /// Request targeting a direct game page URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Request targeting a game by name and author
    pub fn from_name_author(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            author: Some(author.into()),
            ..Default::default()
        }
    }

    /// Resolve the single URL this request targets
    ///
    /// A direct URL takes precedence. Otherwise the URL is derived
    /// deterministically from name+author by lower-casing the name and
    /// hyphenating whitespace: `https://{author}.itch.io/{slug}`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRequest`] when neither a URL nor both name and
    /// author are present.
    pub fn resolved_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        match (&self.name, &self.author) {
            (Some(name), Some(author)) => {
                Ok(format!("https://{}.itch.io/{}", author, slugify(name)))
            }
            _ => Err(Error::InvalidRequest(
                "provide either a URL or both name and author".to_string(),
            )),
        }
    }
}

/// Outcome of one download request
///
/// Created fresh per attempt; only the last attempt's result (success, or the
/// final failed attempt) reaches the caller. Failures never surface as
/// errors from the downloader entry points; they are captured here.
#[derive(Clone, Debug, Default)]
pub struct DownloadResult {
    /// Whether the download and all file operations succeeded
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
    /// Final path of the downloaded artifact, when written to disk
    pub file_path: Option<PathBuf>,
    /// Downloaded bytes, when the request opted into in-memory mode
    pub file_buffer: Option<Vec<u8>>,
    /// Path of the metadata JSON file, when written
    pub metadata_path: Option<PathBuf>,
    /// Metadata record fetched for the game
    pub record: Option<GameRecord>,
    /// HTTP status code associated with a failure, when one was captured
    pub http_status: Option<u16>,
}

impl DownloadResult {
    /// Build a failure result from an attempt error
    ///
    /// Preserves the already-downloaded file path on finalize failures so
    /// data is not silently lost.
    pub(crate) fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            file_path: err.downloaded_path().cloned(),
            http_status: err.http_status(),
            ..Default::default()
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_url_takes_precedence() {
        let request = DownloadRequest {
            url: Some("https://someone.itch.io/something".to_string()),
            name: Some("Other Game".to_string()),
            author: Some("other".to_string()),
            ..Default::default()
        };
        assert_eq!(
            request.resolved_url().unwrap(),
            "https://someone.itch.io/something"
        );
    }

    #[test]
    fn test_url_derived_from_name_and_author() {
        let request = DownloadRequest::from_name_author("game", "user");
        assert_eq!(request.resolved_url().unwrap(), "https://user.itch.io/game");
    }

    #[test]
    fn test_url_derivation_slugifies_name() {
        let request = DownloadRequest::from_name_author("My Cool Game", "dev");
        assert_eq!(
            request.resolved_url().unwrap(),
            "https://dev.itch.io/my-cool-game"
        );
    }

    #[test]
    fn test_missing_target_is_invalid() {
        let request = DownloadRequest {
            name: Some("game".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            request.resolved_url(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_failure_result_carries_status_and_path() {
        let err = Error::Finalize {
            message: "rename failed".to_string(),
            downloaded: PathBuf::from("/dl/game.zip"),
        };
        let result = DownloadResult::from_error(&err);
        assert!(!result.success);
        assert_eq!(result.file_path, Some(PathBuf::from("/dl/game.zip")));
        assert_eq!(result.http_status, None);
    }

    #[test]
    fn test_record_display_name_fallbacks() {
        let record = GameRecord {
            title: Some("Title".to_string()),
            ..Default::default()
        };
        assert_eq!(record.display_name(), "Title");
        assert_eq!(GameRecord::default().display_name(), "game");
    }
}
