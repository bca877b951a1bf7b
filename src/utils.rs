//! Utility functions for URL parsing and path manipulation

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Maximum number of numeric suffixes tried when resolving file collisions
const MAX_SUFFIX_ATTEMPTS: u32 = 9999;

/// Author and name segments parsed out of an itch.io game page URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedGameUrl {
    /// Subdomain segment identifying the author
    pub author: String,
    /// Path segment identifying the game
    pub name: String,
}

fn game_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Compile-time-constant pattern, cannot fail at runtime
        #[allow(clippy::expect_used)]
        Regex::new(r"^(?:https?://)?([\w-]+)\.itch\.io/([\w-]+)/?$")
            .expect("game URL regex is valid")
    })
}

/// Parse an itch.io game page URL into its author and name segments
///
/// # Examples
///
/// ```
/// use itch_dl::utils::parse_game_url;
///
/// let parsed = parse_game_url("https://user.itch.io/game").unwrap();
/// assert_eq!(parsed.author, "user");
/// assert_eq!(parsed.name, "game");
/// ```
pub fn parse_game_url(url: &str) -> Option<ParsedGameUrl> {
    let captures = game_url_regex().captures(url)?;
    Some(ParsedGameUrl {
        author: captures.get(1)?.as_str().to_string(),
        name: captures.get(2)?.as_str().to_string(),
    })
}

/// Derive a URL slug from a game name by lower-casing and hyphenating
/// whitespace runs
///
/// # Examples
///
/// ```
/// use itch_dl::utils::slugify;
///
/// assert_eq!(slugify("My Cool Game"), "my-cool-game");
/// ```
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Find a collision-free path for `stem` + `extension` in `dir`
///
/// Returns `dir/stem.ext` when free, otherwise appends a numeric suffix
/// before the extension (`stem-1.ext`, `stem-2.ext`, ...) until an unused
/// name is found.
///
/// # Errors
/// Returns an error if no unused name is found within the attempt bound.
pub fn unique_path(dir: &Path, stem: &str, extension: Option<&str>) -> Result<PathBuf> {
    let candidate = |base: &str| match extension {
        Some(ext) => dir.join(format!("{}.{}", base, ext)),
        None => dir.join(base),
    };

    let path = candidate(stem);
    if !path.exists() {
        return Ok(path);
    }

    for i in 1..=MAX_SUFFIX_ATTEMPTS {
        let path = candidate(&format!("{}-{}", stem, i));
        if !path.exists() {
            return Ok(path);
        }
    }

    Err(Error::Finalize {
        message: format!(
            "could not find a collision-free name for {} after {} attempts",
            stem, MAX_SUFFIX_ATTEMPTS
        ),
        downloaded: dir.join(stem),
    })
}

/// Path of the metadata JSON file for a game in `dir`
pub fn metadata_path(dir: &Path, game_name: &str) -> PathBuf {
    dir.join(format!("{}-metadata.json", game_name))
}

/// Create a directory recursively, succeeding if it already exists
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}
