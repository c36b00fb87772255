//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Tasks (submissions, status changes)
//! - File workflows (outcomes, escalations, transient retries, durations)
//! - Cleanup (object deletions)
//! - External services (transcoder, scorer)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Task Metrics
// =============================================================================

/// Tasks submitted total by quality preset.
pub static TASKS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_tasks_submitted_total", "Total tasks submitted"),
        &["preset"],
    )
    .unwrap()
});

/// Files accepted in submitted tasks.
pub static FILES_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelpress_files_submitted_total",
        "Total files accepted for conversion",
    )
    .unwrap()
});

/// Tasks reaching a terminal status.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_tasks_finished_total", "Total tasks finished"),
        &["status"], // "completed", "partially_completed", "failed", "cancelled"
    )
    .unwrap()
});

/// File workflows currently running.
pub static ACTIVE_WORKFLOWS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelpress_active_workflows",
        "File workflows currently holding a concurrency slot",
    )
    .unwrap()
});

// =============================================================================
// Workflow Metrics
// =============================================================================

/// Files reaching COMPLETED or FAILED.
pub static FILES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_files_finished_total", "Total files finished"),
        &["outcome"], // "completed", "best_effort", "failed"
    )
    .unwrap()
});

/// Adaptive escalations to a higher preset.
pub static ESCALATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_escalations_total",
            "Total re-conversions with an escalated preset",
        ),
        &["preset"],
    )
    .unwrap()
});

/// Transient-error retries by stage.
pub static TRANSIENT_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_transient_retries_total",
            "Total retries after transient errors",
        ),
        &["stage"], // "converting", "verifying"
    )
    .unwrap()
});

/// Similarity scores reported by the scorer.
pub static QUALITY_SCORES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("reelpress_quality_score", "Distribution of similarity scores")
            .buckets(vec![0.5, 0.7, 0.8, 0.85, 0.9, 0.93, 0.95, 0.97, 0.99, 1.0]),
        &["preset"],
    )
    .unwrap()
});

/// Time from workflow start to a terminal status.
pub static FILE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelpress_file_duration_seconds",
            "Duration of file workflows",
        )
        .buckets(vec![
            10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0,
        ]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Cleanup Metrics
// =============================================================================

/// Cleanup requests by disposition and whether an object was deleted.
pub static CLEANUP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_cleanup_requests_total", "Total cleanup requests"),
        &["action", "result"], // result: "deleted", "missing", "noop", "delete_failed"
    )
    .unwrap()
});

/// Tasks removed by the retention purge.
pub static TASKS_PURGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelpress_tasks_purged_total",
        "Total expired tasks purged",
    )
    .unwrap()
});

/// Audit events that never reached the store.
pub static AUDIT_EVENTS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_audit_events_dropped_total",
            "Audit events lost before being stored",
        ),
        &["reason"], // reason: "channel_full", "channel_closed", "store_error"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelpress_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "transient", "permanent"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Tasks
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(FILES_SUBMITTED.clone()),
        Box::new(TASKS_FINISHED.clone()),
        Box::new(ACTIVE_WORKFLOWS.clone()),
        // Workflows
        Box::new(FILES_FINISHED.clone()),
        Box::new(ESCALATIONS.clone()),
        Box::new(TRANSIENT_RETRIES.clone()),
        Box::new(QUALITY_SCORES.clone()),
        Box::new(FILE_DURATION.clone()),
        // Cleanup
        Box::new(CLEANUP_REQUESTS.clone()),
        Box::new(TASKS_PURGED.clone()),
        Box::new(AUDIT_EVENTS_DROPPED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
