//! Game metadata profile fetching
//!
//! Before a transfer starts, the downloader resolves a descriptive metadata
//! profile for the target game. The [`ProfileFetcher`] trait is the seam;
//! [`HttpProfileFetcher`] is the default implementation, combining the
//! author/name segments parsed out of the game URL with the game page's
//! `data.json` document. A profile counts as found when at least one of the
//! two sources yields data; a request whose profile cannot be resolved at
//! all fails for that attempt.

use crate::error::{Error, Result};
use crate::types::{GameAuthor, GameRecord};
use crate::utils::parse_game_url;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for metadata HTTP requests
const PROFILE_FETCH_TIMEOUT_SECS: u64 = 30;

/// Resolves a descriptive metadata record for a game URL
///
/// The downloader treats a fetch error as fatal for the current attempt
/// (retryable at the retry-policy level).
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetch the metadata record for the game at `game_url`
    async fn fetch(&self, game_url: &str) -> Result<GameRecord>;
}

/// Raw shape of an itch.io game page's `data.json`
#[derive(Debug, Deserialize)]
struct RawMetadata {
    title: Option<String>,
    cover_image: Option<String>,
    authors: Option<Vec<GameAuthor>>,
    #[serde(default)]
    tags: Vec<String>,
    id: Option<u64>,
    links: Option<RawLinks>,
}

#[derive(Debug, Deserialize)]
struct RawLinks {
    comments: Option<String>,
    #[serde(rename = "self")]
    self_link: Option<String>,
}

/// Default [`ProfileFetcher`] fetching `{game_url}/data.json` over HTTP
pub struct HttpProfileFetcher {
    client: reqwest::Client,
}

impl HttpProfileFetcher {
    /// Create a fetcher with a request timeout
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROFILE_FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch and validate the `data.json` document for a game page
    async fn fetch_metadata(&self, game_url: &str) -> Result<(RawMetadata, String)> {
        let metadata_url = format!("{}/data.json", game_url.trim_end_matches('/'));

        let response = self.client.get(&metadata_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Profile {
                message: format!("metadata fetch returned {} for {}", status, metadata_url),
                http_status: Some(status.as_u16()),
            });
        }

        let raw: RawMetadata = response.json().await.map_err(|e| Error::Profile {
            message: format!("failed to parse {}: {}", metadata_url, e),
            http_status: None,
        })?;

        // The page serves data.json even for some non-game URLs; require the
        // fields a real game document always carries
        if raw.title.is_none() || raw.cover_image.is_none() || raw.authors.is_none() {
            return Err(Error::Profile {
                message: format!("metadata document at {} is incomplete", metadata_url),
                http_status: None,
            });
        }

        Ok((raw, metadata_url))
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, game_url: &str) -> Result<GameRecord> {
        let parsed = parse_game_url(game_url);
        let metadata = self.fetch_metadata(game_url).await;

        match (&parsed, &metadata) {
            (None, Err(e)) => {
                return Err(Error::Profile {
                    message: format!(
                        "neither URL parsing nor metadata fetching succeeded for {}: {}",
                        game_url, e
                    ),
                    http_status: e.http_status(),
                });
            }
            (None, Ok(_)) => {
                warn!(url = game_url, "Game URL did not parse, using metadata only");
            }
            (Some(_), Err(e)) => {
                warn!(url = game_url, error = %e, "Metadata fetch failed, using URL parts only");
            }
            (Some(_), Ok(_)) => {
                debug!(url = game_url, "Game profile fetched successfully");
            }
        }

        let mut record = GameRecord {
            author: parsed.as_ref().map(|p| p.author.clone()),
            name: parsed.as_ref().map(|p| p.name.clone()),
            url: Some(game_url.to_string()),
            ..Default::default()
        };

        if let Ok((raw, metadata_url)) = metadata {
            record.title = raw.title;
            record.cover_image = raw.cover_image;
            record.authors = raw.authors.unwrap_or_default();
            record.tags = raw.tags;
            record.id = raw.id;
            record.comments_link = raw.links.as_ref().and_then(|l| l.comments.clone());
            record.self_link = raw.links.as_ref().and_then(|l| l.self_link.clone());
            record.metadata_url = Some(metadata_url);
        }

        Ok(record)
    }
}
