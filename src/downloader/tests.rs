use super::ItchDownloader;
use crate::collection::CollectionClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::initiator::{DownloadInitiator, Initiated, Initiation, InitiationTarget};
use crate::profile::ProfileFetcher;
use crate::session::DownloadSession;
use crate::types::{DownloadRequest, GameRecord};
use crate::utils::parse_game_url;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Profile fetcher that derives the record from the URL, counting calls
struct UrlProfileFetcher {
    calls: AtomicU32,
}

impl UrlProfileFetcher {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProfileFetcher for UrlProfileFetcher {
    async fn fetch(&self, game_url: &str) -> Result<GameRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let parsed = parse_game_url(game_url).ok_or_else(|| Error::Profile {
            message: format!("unparseable game URL: {}", game_url),
            http_status: Some(404),
        })?;
        Ok(GameRecord {
            name: Some(parsed.name),
            author: Some(parsed.author),
            id: Some(1),
            url: Some(game_url.to_string()),
            ..Default::default()
        })
    }
}

/// Initiator that writes the file directly, like an API transfer
struct DirectInitiator;

#[async_trait]
impl DownloadInitiator for DirectInitiator {
    async fn start(&self, target: &InitiationTarget<'_>) -> Result<Initiation> {
        let file_name = format!("{}.zip", target.record.display_name());
        let path = match target.dir {
            Some(dir) => {
                let path = dir.join(&file_name);
                tokio::fs::write(&path, b"bytes").await?;
                Some(path)
            }
            None => None,
        };
        let bytes = target.in_memory.then(|| b"bytes".to_vec());
        Ok(Initiation {
            outcome: Initiated::Direct {
                path,
                bytes,
                file_name,
            },
            session: None,
        })
    }
}

/// Session that counts how often it is closed
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

/// Initiator that kicks off a detached transfer finishing on its own,
/// browser-style: marker file first, then renamed to the final name
struct DetachedInitiator {
    closes: Arc<AtomicU32>,
}

#[async_trait]
impl DownloadInitiator for DetachedInitiator {
    async fn start(&self, target: &InitiationTarget<'_>) -> Result<Initiation> {
        let dir = target
            .dir
            .ok_or_else(|| Error::Initiation {
                message: "detached transfer requires a directory".to_string(),
                http_status: None,
            })?
            .to_path_buf();
        let file_name = format!("{}.zip", target.record.display_name());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let marker = dir.join(format!("{}.crdownload", file_name));
            tokio::fs::write(&marker, b"partial").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::rename(&marker, dir.join(&file_name)).await.unwrap();
        });

        Ok(Initiation {
            outcome: Initiated::Detached,
            session: Some(Arc::new(CountingSession {
                closes: self.closes.clone(),
            })),
        })
    }
}

/// Initiator that always fails with an HTTP status
struct FailingInitiator {
    calls: AtomicU32,
}

#[async_trait]
impl DownloadInitiator for FailingInitiator {
    async fn start(&self, _target: &InitiationTarget<'_>) -> Result<Initiation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Initiation {
            message: "server said no".to_string(),
            http_status: Some(503),
        })
    }
}

fn test_config(dir: &TempDir) -> Config {
    Config {
        download_dir: dir.path().to_path_buf(),
        retry: crate::config::RetryConfig {
            base_delay: Duration::from_millis(10),
            ..Default::default()
        },
        completion: crate::config::CompletionConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_downloader(
    config: Config,
    fetcher: Arc<dyn ProfileFetcher>,
    initiator: Arc<dyn DownloadInitiator>,
) -> Arc<ItchDownloader> {
    Arc::new(ItchDownloader::with_collaborators(config, fetcher, initiator))
}

#[tokio::test]
async fn test_direct_download_writes_file_and_metadata() {
    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    let result = downloader
        .download(&DownloadRequest::from_url("https://user.itch.io/game"))
        .await;

    assert!(result.success, "{}", result.message);
    let file_path = result.file_path.unwrap();
    assert_eq!(file_path, temp.path().join("game.zip"));
    assert!(file_path.exists());

    let metadata_path = result.metadata_path.unwrap();
    assert_eq!(metadata_path, temp.path().join("game-metadata.json"));
    let metadata: GameRecord =
        serde_json::from_str(&std::fs::read_to_string(&metadata_path).unwrap()).unwrap();
    assert_eq!(metadata.name.as_deref(), Some("game"));
    assert_eq!(result.record.unwrap().author.as_deref(), Some("user"));
}

#[tokio::test]
async fn test_desired_file_name_renames_artifact() {
    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        desired_file_name: Some("my-copy".to_string()),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.file_path.unwrap(), temp.path().join("my-copy.zip"));
    assert!(!temp.path().join("game.zip").exists());
}

#[tokio::test]
async fn test_collision_appends_numeric_suffix() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("my-copy.zip"), b"older").unwrap();

    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );
    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        desired_file_name: Some("my-copy".to_string()),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.file_path.unwrap(), temp.path().join("my-copy-1.zip"));
    // The pre-existing file is untouched
    assert_eq!(std::fs::read(temp.path().join("my-copy.zip")).unwrap(), b"older");
}

#[tokio::test]
async fn test_detached_download_waits_for_completion_and_releases_session() {
    let temp = TempDir::new().unwrap();
    let closes = Arc::new(AtomicU32::new(0));
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DetachedInitiator {
            closes: closes.clone(),
        }),
    );

    let result = downloader
        .download(&DownloadRequest::from_url("https://user.itch.io/game"))
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.file_path.unwrap(), temp.path().join("game.zip"));
    assert_eq!(
        closes.load(Ordering::SeqCst),
        1,
        "session must be released exactly once"
    );
    assert!(downloader.sessions().is_empty().await);
}

#[tokio::test]
async fn test_detached_timeout_is_a_failure_with_session_released() {
    struct NeverFinishes {
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DownloadInitiator for NeverFinishes {
        async fn start(&self, _target: &InitiationTarget<'_>) -> Result<Initiation> {
            Ok(Initiation {
                outcome: Initiated::Detached,
                session: Some(Arc::new(CountingSession {
                    closes: self.closes.clone(),
                })),
            })
        }
    }

    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.completion.timeout = Duration::from_millis(200);

    let closes = Arc::new(AtomicU32::new(0));
    let downloader = build_downloader(
        config,
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(NeverFinishes {
            closes: closes.clone(),
        }),
    );

    let result = downloader
        .download(&DownloadRequest::from_url("https://user.itch.io/game"))
        .await;

    assert!(!result.success);
    assert!(result.message.contains("did not complete"));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_request_fails_fast_without_attempts() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(UrlProfileFetcher::new());
    let downloader = build_downloader(
        test_config(&temp),
        fetcher.clone(),
        Arc::new(DirectInitiator),
    );

    let request = DownloadRequest {
        author: Some("user".to_string()),
        retries: Some(5),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(!result.success);
    assert!(result.message.contains("invalid request"));
    assert_eq!(
        fetcher.calls.load(Ordering::SeqCst),
        0,
        "invalid input must fail before any attempt"
    );
}

#[tokio::test]
async fn test_failed_attempts_rerun_whole_sequence() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(UrlProfileFetcher::new());
    let initiator = Arc::new(FailingInitiator {
        calls: AtomicU32::new(0),
    });
    let downloader = build_downloader(test_config(&temp), fetcher.clone(), initiator.clone());

    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        retries: Some(2),
        retry_delay: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(!result.success);
    assert_eq!(result.http_status, Some(503));
    assert_eq!(
        initiator.calls.load(Ordering::SeqCst),
        3,
        "initial attempt plus two retries"
    );
    assert_eq!(
        fetcher.calls.load(Ordering::SeqCst),
        3,
        "each attempt re-fetches the profile"
    );
}

#[tokio::test]
async fn test_in_memory_download_skips_disk() {
    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        in_memory: true,
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.file_buffer.unwrap(), b"bytes");
    assert!(result.file_path.is_none());
    assert!(result.metadata_path.is_none(), "no directory, no metadata file");
}

#[tokio::test]
async fn test_metadata_can_be_declined() {
    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        write_metadata: Some(false),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(result.success, "{}", result.message);
    assert!(result.metadata_path.is_none());
    assert!(!temp.path().join("game-metadata.json").exists());
}

#[tokio::test]
async fn test_finalize_failure_preserves_downloaded_path() {
    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    // A desired name pointing into a missing subdirectory makes the rename
    // fail after the transfer itself succeeded
    let request = DownloadRequest {
        url: Some("https://user.itch.io/game".to_string()),
        desired_file_name: Some("missing-subdir/name".to_string()),
        ..Default::default()
    };
    let result = downloader.download(&request).await;

    assert!(!result.success);
    assert!(result.message.contains("finalize failed"));
    assert_eq!(
        result.file_path,
        Some(temp.path().join("game.zip")),
        "the downloaded artifact path survives the reported failure"
    );
    assert!(temp.path().join("game.zip").exists());
}

#[tokio::test]
async fn test_download_collection_fans_out_to_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/7/collection-games"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "games": [
                {"url": "https://a.itch.io/alpha"},
                {"url": "https://b.itch.io/beta"}
            ],
            "next_page": null
        })))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let downloader = build_downloader(
        test_config(&temp),
        Arc::new(UrlProfileFetcher::new()),
        Arc::new(DirectInitiator),
    );

    let client = CollectionClient::with_base_url(server.uri()).unwrap();
    let results = downloader
        .download_collection_with(&client, "https://itch.io/c/7/favorites", Some(2))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(
        results[0].record.as_ref().unwrap().name.as_deref(),
        Some("alpha")
    );
    assert_eq!(
        results[1].record.as_ref().unwrap().name.as_deref(),
        Some("beta")
    );
}
