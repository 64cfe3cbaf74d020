use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all swap server metrics
const PREFIX: &str = "hairgator";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 240.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Swap Lifecycle Metrics
    pub static ref SWAP_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_swap_outcomes_total"), "Finished swap sequences by outcome"),
        &["outcome"]
    ).expect("Failed to create swap_outcomes_total metric");

    pub static ref SWAP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_swap_duration_seconds"),
            "Duration of a whole swap sequence in seconds"
        )
        .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0, 180.0, 300.0]),
        &["outcome"]
    ).expect("Failed to create swap_duration_seconds metric");

    pub static ref SINK_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_sink_failures_total"),
        "Successful swaps that could not be persisted"
    ).expect("Failed to create sink_failures_total metric");

    // Vendor Metrics
    pub static ref VENDOR_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_vendor_calls_total"), "Calls to the face-swap vendor"),
        &["operation", "result"]
    ).expect("Failed to create vendor_calls_total metric");

    pub static ref TOKEN_REFRESHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_token_refreshes_total"), "Vendor token mint attempts"),
        &["result"]
    ).expect("Failed to create token_refreshes_total metric");

    // System Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process resident memory in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SWAP_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SWAP_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SINK_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VENDOR_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TOKEN_REFRESHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));
}

/// Collapses per-user and per-file paths so labels stay bounded.
pub fn metrics_path(path: &str) -> &str {
    if path.starts_with("/api/history/") {
        "/api/history/{user_id}"
    } else if path.starts_with("/uploads/") {
        "/uploads"
    } else {
        path
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let path = metrics_path(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a finished swap sequence
pub fn record_swap_outcome(outcome: &str, duration: Duration) {
    SWAP_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
    SWAP_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_sink_failure() {
    SINK_FAILURES_TOTAL.inc();
}

/// Record a call to the vendor API
pub fn record_vendor_call(operation: &str, result: &str) {
    VENDOR_CALLS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

pub fn record_token_refresh(result: &str) {
    TOKEN_REFRESHES_TOTAL.with_label_values(&[result]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Router served on the dedicated metrics port.
pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}
