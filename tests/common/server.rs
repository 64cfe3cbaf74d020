//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and media
//! directory, talking to the given mock vendor.

use super::constants::*;
use super::mock_vendor::MockVendor;
use hairgator_swap_server::config::{UploadSettings, VendorSettings};
use hairgator_swap_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use hairgator_swap_server::store::{FailureEntry, ResultSink, SqliteSwapStore, SwapHistory};
use hairgator_swap_server::uploads::UploadStore;
use hairgator_swap_server::{AkoolClient, JobPoller, PollPolicy, TokenCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated database and uploads
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Swap store for direct database access in tests
    pub store: Arc<SqliteSwapStore>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port using the mock vendor's
    /// credentials
    pub async fn spawn(vendor: &MockVendor) -> Self {
        Self::spawn_with_credentials(vendor, MOCK_CLIENT_ID, MOCK_CLIENT_SECRET).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Database creation fails
    /// - Port binding fails
    /// - Server doesn't become ready within timeout
    pub async fn spawn_with_credentials(
        vendor: &MockVendor,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let store = Arc::new(
            SqliteSwapStore::new(temp_dir.path().join("swaps.db"))
                .expect("Failed to open swap store"),
        );

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let vendor_settings = VendorSettings {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            base_url: vendor.base_url.clone(),
            detect_url: vendor.detect_url.clone(),
            request_timeout_secs: 5,
            token_validity_days: 1,
            face_enhance: true,
        };
        let client =
            Arc::new(AkoolClient::new(&vendor_settings).expect("Failed to build vendor client"));
        let tokens = Arc::new(TokenCache::new(
            client.clone(),
            Duration::from_secs(24 * 60 * 60),
        ));

        let policy = PollPolicy {
            max_attempts: TEST_MAX_POLL_ATTEMPTS,
            interval: Duration::from_millis(TEST_POLL_INTERVAL_MS),
            deadline: None,
            detect_retries: 1,
            retry_delay: Duration::from_millis(10),
        };
        let sink: Arc<dyn ResultSink> = store.clone();
        let poller = Arc::new(JobPoller::new(client, tokens.clone(), sink, policy));

        let uploads = UploadStore::new(&UploadSettings {
            media_path: temp_dir.path().join("uploads"),
            public_base_url: base_url.clone(),
        });

        let shutdown = CancellationToken::new();
        let history: Arc<dyn SwapHistory> = store.clone();
        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                history_limit: 20,
                face_enhance: true,
            },
            start_time: Instant::now(),
            poller,
            tokens,
            history: Some(history),
            uploads: Some(Arc::new(uploads)),
            shutdown: shutdown.clone(),
        };

        let app = make_app(state).expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            _temp_dir: temp_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to accept connections. Uses the webhook endpoint
    /// so no vendor token is minted.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            let ready = client
                .post(format!("{}/api/webhook", self.base_url))
                .json(&serde_json::json!({ "ready": true }))
                .send()
                .await;
            match ready {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Waits until the store holds `count` failed swaps. Failures are
    /// recorded in the background.
    pub async fn wait_for_failures(&self, count: usize) -> Vec<FailureEntry> {
        let start = std::time::Instant::now();
        loop {
            let failures = self
                .store
                .get_recent_failures(count + 1)
                .expect("Failed to read failures");
            if failures.len() == count {
                return failures;
            }
            if start.elapsed() > Duration::from_millis(STORE_WRITE_TIMEOUT_MS) {
                panic!(
                    "Expected {} failed swaps, found {}: {:?}",
                    count,
                    failures.len(),
                    failures
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Stops the server and cancels in-flight swaps
        self.shutdown.cancel();
    }
}
