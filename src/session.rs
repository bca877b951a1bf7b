//! Externally-acquired session tracking
//!
//! A download initiator may hand back a resource that needs explicit release
//! (a browser instance, typically). Each attempt registers its session here
//! and releases it when the attempt ends, success or not. On interrupt, the
//! top-level caller releases everything still registered. An explicit
//! registry instead of a process-global handle, so concurrent attempts never
//! fight over shared state.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A releasable resource acquired when a download was initiated
///
/// Implementations wrap whatever the initiator holds open (browser instance,
/// authenticated connection). `close` is called exactly once per registered
/// session.
#[async_trait]
pub trait DownloadSession: Send + Sync {
    /// Release the underlying resource
    async fn close(&self) -> Result<()>;
}

/// Identifier of a registered session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Registry of currently-active download sessions
///
/// Shared across concurrent attempts; each session is owned by the attempt
/// that created it. [`release`](Self::release) is idempotent per id, so the
/// attempt's unconditional release and an interrupt-driven
/// [`release_all`](Self::release_all) cannot double-close a session.
#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<dyn DownloadSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active session, returning the id used to release it
    pub async fn register(&self, session: Arc<dyn DownloadSession>) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().await.insert(id, session);
        debug!(session_id = id, "Registered download session");
        SessionId(id)
    }

    /// Release one session; a no-op if it was already released
    pub async fn release(&self, id: SessionId) {
        let session = self.sessions.lock().await.remove(&id.0);
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(session_id = id.0, error = %e, "Failed to close download session");
            } else {
                debug!(session_id = id.0, "Released download session");
            }
        }
    }

    /// Release every currently-registered session
    ///
    /// Best-effort cleanup for process interrupt: close failures are logged,
    /// not propagated, so one stuck session cannot block the rest.
    pub async fn release_all(&self) {
        let sessions: Vec<(u64, Arc<dyn DownloadSession>)> =
            self.sessions.lock().await.drain().collect();
        if sessions.is_empty() {
            return;
        }
        debug!(count = sessions.len(), "Releasing all download sessions");
        for (id, session) in sessions {
            if let Err(e) = session.close().await {
                warn!(session_id = id, error = %e, "Failed to close download session");
            }
        }
    }

    /// Number of sessions currently registered
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are currently registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingSession {
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DownloadSession for CountingSession {
        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_release_closes_exactly_once() {
        let registry = SessionRegistry::new();
        let closes = Arc::new(AtomicU32::new(0));
        let id = registry
            .register(Arc::new(CountingSession {
                closes: closes.clone(),
            }))
            .await;

        registry.release(id).await;
        registry.release(id).await; // second release is a no-op

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_all_drains_registry() {
        let registry = SessionRegistry::new();
        let closes = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            registry
                .register(Arc::new(CountingSession {
                    closes: closes.clone(),
                }))
                .await;
        }
        assert_eq!(registry.len().await, 3);

        registry.release_all().await;

        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_all_survives_close_failure() {
        struct FailingSession;

        #[async_trait]
        impl DownloadSession for FailingSession {
            async fn close(&self) -> Result<()> {
                Err(crate::error::Error::Watch("session stuck".to_string()))
            }
        }

        let registry = SessionRegistry::new();
        let closes = Arc::new(AtomicU32::new(0));
        registry.register(Arc::new(FailingSession)).await;
        registry
            .register(Arc::new(CountingSession {
                closes: closes.clone(),
            }))
            .await;

        registry.release_all().await;

        assert_eq!(closes.load(Ordering::SeqCst), 1, "healthy session still closed");
        assert!(registry.is_empty().await);
    }
}
