//! Error types for itch-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error variants for each stage of a download attempt
//! - HTTP status code capture for failed API calls
//! - Preservation of already-downloaded file paths on finalize failures

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for itch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for itch-dl
///
/// Each variant corresponds to a stage of the single-item download sequence,
/// so failures can be classified as retryable or permanent without string
/// matching.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither a direct URL nor a name+author pair was supplied
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The external metadata profile lookup failed or returned not-found
    #[error("profile resolution failed: {message}")]
    Profile {
        /// Human-readable description of the lookup failure
        message: String,
        /// HTTP status code returned by the profile endpoint, if any
        http_status: Option<u16>,
    },

    /// The external download-start collaborator reported failure
    #[error("download initiation failed: {message}")]
    Initiation {
        /// Human-readable description of the initiation failure
        message: String,
        /// HTTP status code returned by the initiator, if any
        http_status: Option<u16>,
    },

    /// The completion detector did not observe a finished artifact in time
    #[error("download did not complete within {waited:?} in {}", dir.display())]
    CompletionTimeout {
        /// Directory that was being watched
        dir: PathBuf,
        /// How long the watcher waited before giving up
        waited: std::time::Duration,
    },

    /// Rename or metadata write failed after a successful transfer
    ///
    /// Carries the path of the already-downloaded artifact so the data is
    /// not silently lost even though the attempt is reported as failed.
    #[error("finalize failed: {message}")]
    Finalize {
        /// Human-readable description of the finalize failure
        message: String,
        /// Path of the downloaded file that survived the failure
        downloaded: PathBuf,
    },

    /// Filesystem watcher could not be set up or delivered an error
    #[error("watch error: {0}")]
    Watch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status code associated with this error, if one was captured
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Profile { http_status, .. } | Error::Initiation { http_status, .. } => {
                *http_status
            }
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Path of a file that was downloaded before the error occurred, if any
    pub fn downloaded_path(&self) -> Option<&PathBuf> {
        match self {
            Error::Finalize { downloaded, .. } => Some(downloaded),
            _ => None,
        }
    }
}
