//! Configuration types for itch-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Top-level configuration for [`ItchDownloader`](crate::ItchDownloader)
///
/// Works out of the box with zero configuration; every field has a sensible
/// default and can be overridden per request where the request carries the
/// matching field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Download directory used when a request names none (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads in a batch (default: 1, clamped to >= 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Write a `{name}-metadata.json` file next to each artifact (default: true)
    #[serde(default = "default_true")]
    pub write_metadata: bool,

    /// itch.io API key for authenticated direct transfers
    #[serde(default)]
    pub api_key: Option<String>,

    /// Retry behavior for failed attempts
    #[serde(default)]
    pub retry: RetryConfig,

    /// Completion detection behavior
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            write_metadata: true,
            api_key: None,
            retry: RetryConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

/// Retry configuration with exponential backoff
///
/// A request that fails every attempt performs exactly `max_retries + 1`
/// attempts, waiting `base_delay * 2^attempt` between them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 0)
    #[serde(default)]
    pub max_retries: u32,

    /// Base delay before the first retry (default: 500ms)
    #[serde(default = "default_base_delay", with = "duration_ms_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false, delays grow strictly
    /// exponentially)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

/// Completion detection configuration
///
/// Controls how long the filesystem watcher waits for an externally-initiated
/// transfer to finish and which filename suffixes it treats as in-progress
/// markers or transient noise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// How long to wait for a finished artifact before timing out
    /// (default: 120 seconds)
    #[serde(default = "default_completion_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Suffix marking an in-progress, not-yet-finalized transfer
    /// (default: ".crdownload")
    #[serde(default = "default_marker_suffix")]
    pub marker_suffix: String,

    /// Suffixes of always-transient temporary/lock files to ignore entirely
    /// (default: [".tmp", ".temp"])
    #[serde(default = "default_transient_suffixes")]
    pub transient_suffixes: Vec<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout: default_completion_timeout(),
            marker_suffix: default_marker_suffix(),
            transient_suffixes: default_transient_suffixes(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_completion_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_marker_suffix() -> String {
    ".crdownload".to_string()
}

fn default_transient_suffixes() -> Vec<String> {
    vec![".tmp".to_string(), ".temp".to_string()]
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
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
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
