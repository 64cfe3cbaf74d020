//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per swap server endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }

    /// Submits a swap for the test user and style
    pub async fn face_swap(&self, customer_image: &str, style_image: &str) -> Response {
        self.face_swap_raw(json!({
            "customerImageUrl": customer_image,
            "styleImageUrl": style_image,
            "userId": TEST_USER_ID,
            "userName": "Test User",
            "styleId": TEST_STYLE_ID,
            "styleName": TEST_STYLE_NAME,
        }))
        .await
    }

    pub async fn face_swap_raw(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/api/face-swap", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Face swap request failed")
    }

    pub async fn get_history(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/api/history/{}", self.base_url, user_id))
            .send()
            .await
            .expect("History request failed")
    }

    pub async fn get_statistics(&self) -> Response {
        self.client
            .get(format!("{}/api/statistics", self.base_url))
            .send()
            .await
            .expect("Statistics request failed")
    }

    pub async fn post_webhook(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/api/webhook", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Webhook request failed")
    }

    /// Fetches an absolute URL, e.g. a published upload
    pub async fn get_url(&self, url: &str) -> Response {
        self.client
            .get(url)
            .send()
            .await
            .expect("Request failed")
    }

    /// Polls the history of `user_id` until it holds `count` entries.
    /// Successful swaps are recorded in the background.
    pub async fn wait_for_history(&self, user_id: &str, count: usize) -> Value {
        let start = std::time::Instant::now();
        loop {
            let body: Value = self.get_history(user_id).await.json().await.unwrap();
            if body["history"].as_array().map(|h| h.len()) == Some(count) {
                return body;
            }
            if start.elapsed() > Duration::from_millis(STORE_WRITE_TIMEOUT_MS) {
                panic!(
                    "History of {} did not reach {} entries, last: {}",
                    user_id, count, body
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
