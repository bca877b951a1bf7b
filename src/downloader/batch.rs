//! Batch scheduling: bounded-pool and fully-parallel dispatch.
//!
//! Bounded-pool mode spawns `min(K, N)` workers that claim request indices
//! from a shared atomic cursor and write results into per-index slots, so
//! `results[i]` always corresponds to `requests[i]` no matter which worker
//! ran it or in what order requests completed. Fully-parallel mode (opted in
//! by any request in the batch) runs everything simultaneously with no
//! shared limit. Either way the call returns only after every request has a
//! result; one request's failure never aborts the rest.

use crate::types::{DownloadRequest, DownloadResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use super::ItchDownloader;

impl ItchDownloader {
    /// Download an ordered list of games
    ///
    /// `concurrency` bounds the number of simultaneous downloads (clamped to
    /// at least 1); `None` uses the configured default. The returned list
    /// has the same length and order as `requests`.
    pub async fn download_batch(
        self: &Arc<Self>,
        requests: Vec<DownloadRequest>,
        concurrency: Option<usize>,
    ) -> Vec<DownloadResult> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        if requests.iter().any(|r| r.parallel) {
            info!(requests = total, "Starting fully-parallel batch");
            return self.run_parallel(requests).await;
        }

        let limit = concurrency
            .unwrap_or(self.config.max_concurrent_downloads)
            .max(1)
            .min(total);
        info!(requests = total, workers = limit, "Starting bounded batch");
        self.run_bounded(requests, limit).await
    }

    /// Run every request simultaneously, no shared limit
    async fn run_parallel(self: &Arc<Self>, requests: Vec<DownloadRequest>) -> Vec<DownloadResult> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let downloader = Arc::clone(self);
                tokio::spawn(async move { downloader.download(&request).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|e| {
                error!(error = %e, "Download task panicked");
                missing_result()
            }));
        }
        results
    }

    /// Bounded-pool dispatch over a shared cursor
    async fn run_bounded(
        self: &Arc<Self>,
        requests: Vec<DownloadRequest>,
        limit: usize,
    ) -> Vec<DownloadResult> {
        let total = requests.len();
        let requests = Arc::new(requests);
        let results: Arc<Vec<OnceLock<DownloadResult>>> =
            Arc::new((0..total).map(|_| OnceLock::new()).collect());
        let cursor = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..limit)
            .map(|worker| {
                let downloader = Arc::clone(self);
                let requests = Arc::clone(&requests);
                let results = Arc::clone(&results);
                let cursor = Arc::clone(&cursor);

                tokio::spawn(async move {
                    loop {
                        // Atomic claim: each index goes to exactly one worker
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        if index >= requests.len() {
                            break;
                        }
                        let result = downloader.download(&requests[index]).await;
                        if results[index].set(result).is_err() {
                            error!(worker = worker, index = index, "Result slot already filled");
                        }
                    }
                })
            })
            .collect();

        // Join semantics: no worker left running past this point
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Batch worker panicked");
            }
        }

        match Arc::try_unwrap(results) {
            Ok(slots) => slots
                .into_iter()
                .map(|slot| slot.into_inner().unwrap_or_else(missing_result))
                .collect(),
            Err(shared) => shared
                .iter()
                .map(|slot| slot.get().cloned().unwrap_or_else(missing_result))
                .collect(),
        }
    }
}

/// Placeholder failure for a slot whose worker died before filling it
fn missing_result() -> DownloadResult {
    DownloadResult {
        success: false,
        message: "download task did not produce a result".to_string(),
        ..Default::default()
    }
}
