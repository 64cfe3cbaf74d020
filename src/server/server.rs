use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use super::metrics::make_metrics_app;
use super::{log_requests, state::*};
use crate::poller::{ImageSide, RequestMetadata, SwapError, SwapRequest};
use crate::store::SwapHistory;
use crate::vendor::SwapOptions;

/// Two base64 encoded photos plus the JSON around them.
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

const ANONYMOUS_USER_ID: &str = "anonymous";
const ANONYMOUS_USER_NAME: &str = "Anonymous";

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    vendor_connected: bool,
    store_connected: bool,
    uptime: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct FaceSwapBody {
    #[serde(alias = "customerImageUrl")]
    customer_image_url: Option<String>,
    #[serde(alias = "styleImageUrl")]
    style_image_url: Option<String>,
    #[serde(rename = "userId", alias = "user_id")]
    user_id: Option<String>,
    #[serde(rename = "userName", alias = "user_name")]
    user_name: Option<String>,
    #[serde(rename = "styleId", alias = "style_id")]
    style_id: Option<String>,
    #[serde(rename = "styleName", alias = "style_name")]
    style_name: Option<String>,
}

#[derive(Serialize)]
struct FaceSwapResponse {
    success: bool,
    result_image_url: String,
    #[serde(rename = "imageUrl")]
    image_url: String,
    job_id: String,
    /// Seconds, two decimals.
    processing_time: f64,
    attempts: u32,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    error_kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    side: Option<ImageSide>,
}

fn error_response(
    status: StatusCode,
    error_kind: &'static str,
    error: impl Into<String>,
    side: Option<ImageSide>,
) -> Response {
    let body = ErrorResponse {
        success: false,
        error: error.into(),
        error_kind,
        side,
    };
    (status, Json(body)).into_response()
}

fn swap_error_status(err: &SwapError) -> StatusCode {
    match err {
        SwapError::DetectionFailed { .. } => StatusCode::BAD_REQUEST,
        SwapError::Auth(_)
        | SwapError::VendorUnavailable { .. }
        | SwapError::SubmissionFailed { .. } => StatusCode::BAD_GATEWAY,
        SwapError::ProcessingFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SwapError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        SwapError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn swap_error_response(err: SwapError) -> Response {
    let side = match &err {
        SwapError::DetectionFailed { side, .. } => Some(*side),
        _ => None,
    };
    error_response(swap_error_status(&err), err.kind(), err.to_string(), side)
}

fn store_unavailable() -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "store_unavailable",
        "Swap history is not enabled on this server",
        None,
    )
}

/// Runs a synchronous store query on the blocking thread pool.
async fn query_store<T, F>(history: Arc<dyn SwapHistory>, query: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn SwapHistory) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || query(history.as_ref()))
        .await
        .context("Swap store task panicked")?
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn health(State(state): State<ServerState>) -> Response {
    let store_connected = match &state.history {
        Some(history) => query_store(history.clone(), |history| Ok(history.ping()))
            .await
            .unwrap_or(false),
        None => false,
    };

    let mut body = HealthResponse {
        status: "healthy",
        vendor_connected: true,
        store_connected,
        uptime: format_uptime(state.start_time.elapsed()),
        timestamp: Utc::now().to_rfc3339(),
        error: None,
    };

    match state.tokens.get_token().await {
        Ok(_) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            warn!("Health check could not obtain a vendor token: {}", err);
            body.status = "unhealthy";
            body.vendor_connected = false;
            body.error = Some(err.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn face_swap(
    State(state): State<ServerState>,
    payload: Result<Json<FaceSwapBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                rejection.body_text(),
                None,
            )
        }
    };

    let (Some(customer_image), Some(style_image)) = (
        non_empty(body.customer_image_url),
        non_empty(body.style_image_url),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Both customer_image_url and style_image_url are required",
            None,
        );
    };

    let metadata = RequestMetadata {
        user_id: non_empty(body.user_id).unwrap_or_else(|| ANONYMOUS_USER_ID.to_string()),
        user_name: non_empty(body.user_name).unwrap_or_else(|| ANONYMOUS_USER_NAME.to_string()),
        style_id: non_empty(body.style_id).unwrap_or_default(),
        style_name: non_empty(body.style_name).unwrap_or_default(),
    };

    let (source, target) = match &state.uploads {
        Some(uploads) => {
            let source = uploads
                .publish_if_inline(&customer_image, "customer_photos")
                .await;
            let target = uploads.publish_if_inline(&style_image, "style_photos").await;
            match (source, target) {
                (Ok(source), Ok(target)) => (source, target),
                (Err(err), _) | (_, Err(err)) => {
                    warn!("Rejected uploaded image: {}", err);
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "invalid_image",
                        err.to_string(),
                        None,
                    );
                }
            }
        }
        None => (customer_image, style_image),
    };

    info!(
        user_id = %metadata.user_id,
        style_id = %metadata.style_id,
        "Starting face swap"
    );

    let request = SwapRequest::new(source, target)
        .with_options(SwapOptions {
            face_enhance: state.config.face_enhance,
            ..Default::default()
        })
        .with_metadata(metadata);

    let cancel = state.shutdown.child_token();
    match state.poller.run(&request, &cancel).await {
        Ok(success) => {
            let processing_time = (success.elapsed.as_secs_f64() * 100.0).round() / 100.0;
            Json(FaceSwapResponse {
                success: true,
                result_image_url: success.output_url.clone(),
                image_url: success.output_url,
                job_id: success.job_id,
                processing_time,
                attempts: success.attempts,
            })
            .into_response()
        }
        Err(err) => swap_error_response(err),
    }
}

#[derive(Serialize)]
struct HistoryResponse<T: Serialize> {
    success: bool,
    history: T,
}

async fn get_history(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    let Some(history) = state.history.clone() else {
        return store_unavailable();
    };
    let limit = state.config.history_limit;
    let owner = user_id.clone();
    let entries = query_store(history, move |history| {
        history.get_user_history(&owner, limit)
    })
    .await;
    match entries {
        Ok(entries) => Json(HistoryResponse {
            success: true,
            history: entries,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to load history of {}: {:#}", user_id, err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "Failed to load history",
                None,
            )
        }
    }
}

#[derive(Serialize)]
struct StatisticsResponse<T: Serialize> {
    success: bool,
    statistics: T,
}

async fn get_statistics(State(history): State<OptionalSwapHistory>) -> Response {
    let Some(history) = history else {
        return store_unavailable();
    };
    match query_store(history, |history| history.get_statistics()).await {
        Ok(statistics) => Json(StatisticsResponse {
            success: true,
            statistics,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to load statistics: {:#}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "Failed to load statistics",
                None,
            )
        }
    }
}

#[derive(Serialize)]
struct WebhookResponse {
    status: &'static str,
}

/// Vendor status callbacks. Results are collected by polling, so the payload
/// is only logged.
async fn webhook(payload: Result<Json<serde_json::Value>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(payload)) => {
            info!("Vendor webhook received: {}", payload);
            Json(WebhookResponse { status: "received" }).into_response()
        }
        Err(rejection) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            rejection.body_text(),
            None,
        ),
    }
}

pub fn make_app(state: ServerState) -> Result<Router> {
    let api_routes: Router = Router::new()
        .route("/face-swap", post(face_swap))
        .route("/history/{user_id}", get(get_history))
        .route("/statistics", get(get_statistics))
        .route("/webhook", post(webhook))
        .with_state(state.clone());

    let mut app: Router = Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/api", api_routes);

    if let Some(uploads) = &state.uploads {
        std::fs::create_dir_all(uploads.media_path()).with_context(|| {
            format!(
                "Failed to create media directory {}",
                uploads.media_path().display()
            )
        })?;
        app = app.nest_service("/uploads", ServeDir::new(uploads.media_path()));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(app
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(cors))
}

pub async fn run_server(state: ServerState, metrics_port: u16) -> Result<()> {
    let port = state.config.port;
    let shutdown = state.shutdown.clone();
    let app = make_app(state)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Face swap server listening on port {}", port);
    info!("Metrics available on port {}", metrics_port);

    let main_shutdown = shutdown.clone();
    let main_server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { main_shutdown.cancelled().await });
    let metrics_server = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    let started = Instant::now();
    tokio::try_join!(
        async { main_server.await.context("Main server failed") },
        async { metrics_server.await.context("Metrics server failed") },
    )?;
    info!(
        "Server stopped after {}",
        format_uptime(started.elapsed())
    );
    Ok(())
}
