//! itch.io collection listing
//!
//! A collection URL (`https://itch.io/c/{id}/{slug}`) identifies a curated
//! list of games. This module pages through the collection API and returns
//! the game page URLs, ready to be fanned out as a batch download.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout for collection API calls
const COLLECTION_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default itch.io API endpoint
const DEFAULT_API_BASE: &str = "https://api.itch.io";

fn collection_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Compile-time-constant pattern, cannot fail at runtime
        #[allow(clippy::expect_used)]
        Regex::new(r"/c/(\d+)").expect("collection id regex is valid")
    })
}

/// Extract the numeric collection id from a collection URL
///
/// # Errors
/// Returns [`Error::InvalidRequest`] when the URL carries no `/c/{id}` segment.
pub fn parse_collection_id(collection_url: &str) -> Result<String> {
    collection_id_regex()
        .captures(collection_url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| {
            Error::InvalidRequest(format!("not a collection URL: {}", collection_url))
        })
}

#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(default)]
    games: Vec<CollectionGame>,
    #[serde(default)]
    next_page: Option<serde_json::Value>,
    #[serde(default)]
    next_page_url: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CollectionGame {
    url: Option<String>,
}

/// Client for listing the games of an itch.io collection
pub struct CollectionClient {
    client: reqwest::Client,
    base_url: String,
}

impl CollectionClient {
    /// Create a client against the public itch.io API
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Create a client against a custom API endpoint
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLECTION_FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// List every game page URL in a collection, following pagination
    ///
    /// # Errors
    /// Returns an error when a page request fails; the HTTP status of the
    /// failing page is preserved.
    pub async fn game_urls(
        &self,
        collection_id: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        let mut page: u64 = 1;

        loop {
            let mut url = Url::parse(&format!(
                "{}/collections/{}/collection-games",
                self.base_url, collection_id
            ))
            .map_err(|e| Error::InvalidRequest(format!("invalid collection API URL: {}", e)))?;
            url.query_pairs_mut().append_pair("page", &page.to_string());
            if let Some(key) = api_key {
                url.query_pairs_mut().append_pair("api_key", key);
            }

            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Profile {
                    message: format!(
                        "failed to fetch collection {} page {}: {}",
                        collection_id, page, status
                    ),
                    http_status: Some(status.as_u16()),
                });
            }

            let body: CollectionPage = response.json().await?;
            for game in &body.games {
                if let Some(url) = &game.url {
                    urls.push(url.clone());
                }
            }

            let next = body.next_page.or(body.next_page_url);
            match next {
                None | Some(serde_json::Value::Null) => break,
                Some(value) => {
                    // The API reports the next page either as a number or as
                    // something opaque; fall back to a simple increment
                    page = value.as_u64().unwrap_or(page + 1);
                }
            }
        }

        debug!(
            collection_id = collection_id,
            games = urls.len(),
            "Collection listed"
        );
        Ok(urls)
    }
}
