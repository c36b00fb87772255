//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the reelpress server:
//! - HTTP request metrics (latency, counts, errors)
//! - Signed object transfers
//! - Coordinator status (collected dynamically)
//!
//! Task and workflow metrics live in `reelpress_core::metrics` and are
//! registered here too.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelpress_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelpress_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Object Transfer Metrics
// =============================================================================

/// Bytes moved through the signed object routes.
pub static OBJECT_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_object_bytes_total",
            "Bytes transferred through signed object URLs",
        ),
        &["direction"], // "upload", "download"
    )
    .unwrap()
});

/// Signed URL requests refused before any transfer.
pub static OBJECT_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_object_rejections_total",
            "Signed object requests refused",
        ),
        &["reason"], // "signature", "expired", "too_large"
    )
    .unwrap()
});

// =============================================================================
// Coordinator Metrics
// =============================================================================

/// Whether the coordinator maintenance loop is running (1 = yes, 0 = no).
pub static COORDINATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelpress_coordinator_running",
        "Whether the task coordinator is running",
    )
    .unwrap()
});

/// Tasks with live workflows in this process.
pub static ACTIVE_TASKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelpress_active_tasks",
        "Tasks with running file workflows",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Objects
    registry.register(Box::new(OBJECT_BYTES.clone())).unwrap();
    registry
        .register(Box::new(OBJECT_REJECTIONS.clone()))
        .unwrap();

    // Coordinator
    registry
        .register(Box::new(COORDINATOR_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(ACTIVE_TASKS.clone())).unwrap();

    // Core metrics (tasks, workflows, cleanup, external services)
    for metric in reelpress_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the coordinator right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.coordinator().coordinator_status().await;
    COORDINATOR_RUNNING.set(if status.running { 1 } else { 0 });
    ACTIVE_TASKS.set(status.active_tasks as i64);
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static FILE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/files/[^/]+").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
///
/// Object keys are collapsed entirely so label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/objects/") {
        if !rest.is_empty() {
            return "/api/v1/objects/{key}".to_string();
        }
    }

    let result = UUID_RE.replace_all(path, "{id}");
    let result = FILE_ID_RE.replace_all(&result, "/files/{file_id}");
    result.to_string()
}
