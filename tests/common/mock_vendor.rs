//! In-process stand-in for the Akool API
//!
//! Serves the token, detect, submit and status endpoints on a random port.
//! Responses follow a script set up by the test; anything not scripted
//! succeeds.

use super::constants::*;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Path prefix of the Akool open API
const API_PREFIX: &str = "/api/open/v3";

/// Status check body reporting `faceswap_status`. Status 3 carries
/// [`OUTPUT_IMAGE_URL`].
pub fn poll_status(faceswap_status: i64) -> Value {
    let url = if faceswap_status == 3 {
        OUTPUT_IMAGE_URL
    } else {
        ""
    };
    json!({
        "code": 1000,
        "msg": "OK",
        "data": { "result": [{ "faceswap_status": faceswap_status, "url": url }] }
    })
}

/// Status check body without any job record.
pub fn poll_empty() -> Value {
    json!({ "code": 1000, "msg": "OK", "data": { "result": [] } })
}

#[derive(Default)]
struct MockState {
    token_calls: AtomicUsize,
    detect_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,

    detect_bodies: Mutex<Vec<Value>>,
    submit_bodies: Mutex<Vec<Value>>,
    polled_ids: Mutex<Vec<String>>,

    tokens_revoked: AtomicBool,
    faceless_images: Mutex<Vec<String>>,
    detect_http_failures: Mutex<u32>,
    submit_responses: Mutex<VecDeque<Value>>,
    poll_responses: Mutex<VecDeque<Value>>,
}

pub struct MockVendor {
    /// Base URL of the open API, e.g. "http://127.0.0.1:12345/api/open/v3"
    pub base_url: String,
    /// Full URL of the face detection endpoint
    pub detect_url: String,

    state: Arc<MockState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

fn is_authorized(state: &MockState, headers: &HeaderMap) -> bool {
    !state.tokens_revoked.load(Ordering::SeqCst)
        && headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with(&format!("Bearer {}", MOCK_TOKEN_PREFIX)))
        .unwrap_or(false)
}

fn token_rejected() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": 1101, "msg": "Invalid authorization" })),
    )
        .into_response()
}

async fn get_token(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    let n = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if body["clientId"] == MOCK_CLIENT_ID && body["clientSecret"] == MOCK_CLIENT_SECRET {
        Json(json!({ "code": 1000, "msg": "OK", "token": format!("{}{}", MOCK_TOKEN_PREFIX, n) }))
    } else {
        Json(json!({ "code": 1101, "msg": "Invalid client credentials" }))
    }
}

async fn detect(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.detect_calls.fetch_add(1, Ordering::SeqCst);
    state.detect_bodies.lock().unwrap().push(body.clone());

    if !is_authorized(&state, &headers) {
        return token_rejected();
    }
    {
        let mut failures = state.detect_http_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let image = body["image_url"]
        .as_str()
        .or_else(|| body["img"].as_str())
        .unwrap_or_default();
    let faceless = state
        .faceless_images
        .lock()
        .unwrap()
        .iter()
        .any(|f| f == image);
    if faceless {
        return Json(json!({ "error_code": 1, "error_msg": "No face detected" })).into_response();
    }

    Json(json!({
        "error_code": 0,
        "error_msg": "SUCCESS",
        "landmarks_str": [MOCK_LANDMARKS],
        "region": [[80, 90, 90, 110]]
    }))
    .into_response()
}

async fn submit(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.submit_calls.fetch_add(1, Ordering::SeqCst);
    state.submit_bodies.lock().unwrap().push(body);

    if !is_authorized(&state, &headers) {
        return token_rejected();
    }

    let scripted = state.submit_responses.lock().unwrap().pop_front();
    let response = scripted.unwrap_or_else(|| {
        json!({
            "code": 1000,
            "msg": "OK",
            "data": { "_id": MOCK_RESULT_ID, "job_id": MOCK_JOB_ID }
        })
    });
    Json(response).into_response()
}

async fn list_by_ids(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.poll_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(id) = params.get("_ids") {
        state.polled_ids.lock().unwrap().push(id.clone());
    }

    if !is_authorized(&state, &headers) {
        return token_rejected();
    }

    let scripted = state.poll_responses.lock().unwrap().pop_front();
    Json(scripted.unwrap_or_else(|| poll_status(3))).into_response()
}

impl MockVendor {
    /// Spawns a mock vendor on a random port
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route(&format!("{}/getToken", API_PREFIX), post(get_token))
            .route(
                &format!("{}/faceswap/highquality/specifyimage", API_PREFIX),
                post(submit),
            )
            .route(
                &format!("{}/faceswap/result/listbyids", API_PREFIX),
                get(list_by_ids),
            )
            .route("/detect", post(detect))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock vendor failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}{}", port, API_PREFIX),
            detect_url: format!("http://127.0.0.1:{}/detect", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Detection of `image` reports no face
    pub fn reject_face(&self, image: &str) {
        self.state
            .faceless_images
            .lock()
            .unwrap()
            .push(image.to_string());
    }

    /// The next `count` detect calls answer HTTP 500
    pub fn fail_detect_with_server_error(&self, count: u32) {
        *self.state.detect_http_failures.lock().unwrap() = count;
    }

    /// Every bearer token, including freshly minted ones, is refused
    pub fn revoke_all_tokens(&self) {
        self.state.tokens_revoked.store(true, Ordering::SeqCst);
    }

    /// Queues a raw body for the next submit call
    pub fn script_submit(&self, response: Value) {
        self.state
            .submit_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    /// Queues raw bodies answered to the next status checks, in order
    pub fn script_polls(&self, responses: Vec<Value>) {
        self.state
            .poll_responses
            .lock()
            .unwrap()
            .extend(responses);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.state.detect_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.state.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.state.poll_calls.load(Ordering::SeqCst)
    }

    pub fn detect_bodies(&self) -> Vec<Value> {
        self.state.detect_bodies.lock().unwrap().clone()
    }

    pub fn submit_bodies(&self) -> Vec<Value> {
        self.state.submit_bodies.lock().unwrap().clone()
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.state.polled_ids.lock().unwrap().clone()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
