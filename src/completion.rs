//! Download completion detection from filesystem events
//!
//! Downloads started by an external agent (a browser, typically) give no
//! direct completion callback. This module infers completion by watching the
//! target directory: the agent writes a partial-download marker file
//! (`.crdownload` by default) and renames it to its final name when the
//! transfer finishes. The watcher resolves with the first qualifying new
//! file, or with `None` when nothing qualifies before the timeout.
//!
//! Marker files already present when the watch begins belong to unrelated,
//! already-running downloads and are ignored for the lifetime of the watch.
//! Temporary/lock files (`.tmp`, `.temp`) are always ignored.
//!
//! # Limitation
//!
//! Two downloads proceeding simultaneously into the same directory cannot be
//! disambiguated: the watcher takes the first non-ignored, non-temporary new
//! file. Callers that need the distinction must serialize watcher use per
//! directory.
//!
//! # Example
//!
//! ```no_run
//! use itch_dl::completion::CompletionWatcher;
//! use itch_dl::config::CompletionConfig;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let watcher = CompletionWatcher::new(Path::new("./downloads"), CompletionConfig::default())?;
//! match watcher.wait().await? {
//!     Some(path) => println!("download finished: {}", path.display()),
//!     None => println!("timed out"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::ModifyKind,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error};

/// Watches one directory for the completion of one in-progress download
///
/// Ephemeral: construct it before initiating the transfer (so the marker
/// snapshot predates any new files), call [`wait`](Self::wait) once, then
/// drop it.
pub struct CompletionWatcher {
    /// Filesystem watcher instance, held so watching outlives construction;
    /// watching stops when this is dropped
    _watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    /// Directory being watched
    dir: PathBuf,

    /// Marker files present before the watch began, ignored for its lifetime
    ignored: HashSet<PathBuf>,

    /// Timeout and suffix configuration
    config: CompletionConfig,
}

impl CompletionWatcher {
    /// Start watching `dir` for a completed download
    ///
    /// Snapshots the marker files already present so they are never taken
    /// for the download this watch is waiting on.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed or the filesystem
    /// watcher cannot be initialized.
    pub fn new(dir: &Path, config: CompletionConfig) -> Result<Self> {
        let mut ignored = HashSet::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if has_suffix(&path, &config.marker_suffix) {
                ignored.insert(path);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("failed to watch {}: {}", dir.display(), e)))?;

        debug!(
            dir = %dir.display(),
            pre_existing_markers = ignored.len(),
            "Watching directory for download completion"
        );

        Ok(Self {
            _watcher: watcher,
            rx,
            dir: dir.to_path_buf(),
            ignored,
            config,
        })
    }

    /// Wait for the download to finish
    ///
    /// Resolves with `Some(path)` of the completed artifact, or `None` when
    /// no qualifying file appears before the configured timeout. A download
    /// that writes its file atomically, without ever creating a marker,
    /// still resolves on that file's creation.
    ///
    /// # Errors
    /// Returns an error if the watcher channel closes unexpectedly.
    pub async fn wait(mut self) -> Result<Option<PathBuf>> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => {
                    debug!(
                        dir = %self.dir.display(),
                        timeout = ?self.config.timeout,
                        "No completed download observed before timeout"
                    );
                    return Ok(None);
                }
                Ok(None) => {
                    return Err(Error::Watch(
                        "filesystem watcher channel closed unexpectedly".to_string(),
                    ));
                }
                Ok(Some(Err(e))) => {
                    return Err(Error::Watch(e.to_string()));
                }
                Ok(Some(Ok(event))) => event,
            };

            if let Some(path) = self.handle_event(&event) {
                return Ok(Some(path));
            }
        }
    }

    /// Process one filesystem event; returns the completed artifact path
    /// when the event resolves the watch
    fn handle_event(&mut self, event: &Event) -> Option<PathBuf> {
        // Only creations, renames, and removals are meaningful here
        let qualifying = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_)
        );
        if !qualifying {
            return None;
        }

        for path in &event.paths {
            if self.is_transient(path) || self.ignored.contains(path) {
                continue;
            }

            if has_suffix(path, &self.config.marker_suffix) {
                if path.exists() {
                    debug!(marker = %path.display(), "New download in progress");
                } else {
                    // The agent renames the marker to its final name on
                    // completion; the final file lands next
                    debug!(marker = %path.display(), "Marker gone, completion imminent");
                }
                continue;
            }

            // Non-marker, non-transient, not pre-existing: the completed
            // artifact. Rename-away events carry the old path too, so only
            // a path that actually exists qualifies.
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
            ) && path.exists()
            {
                debug!(path = %path.display(), "Download complete");
                return Some(path.clone());
            }
        }

        None
    }

    /// Check if a path has one of the always-transient suffixes
    fn is_transient(&self, path: &Path) -> bool {
        self.config
            .transient_suffixes
            .iter()
            .any(|suffix| has_suffix(path, suffix))
    }
}

/// Case-sensitive filename suffix check (`.crdownload`, `.tmp`, ...)
fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(suffix))
        .unwrap_or(false)
}
