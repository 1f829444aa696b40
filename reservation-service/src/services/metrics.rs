//! Prometheus metrics for reservation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for sync runs by scope and status.
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reservation_sync_runs_total",
        "Total number of reconciliation runs",
        &["scope", "status"]
    )
    .expect("Failed to register SYNC_RUNS")
});

/// Counter for ledger mutations performed by reconciliation.
pub static SYNC_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reservation_sync_operations_total",
        "Ledger mutations performed by reconciliation",
        &["operation"]
    )
    .expect("Failed to register SYNC_OPERATIONS")
});

/// Histogram for feed fetch duration by outcome.
pub static FEED_FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reservation_feed_fetch_duration_seconds",
        "Feed fetch duration in seconds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register FEED_FETCH_DURATION")
});

/// Counter for match computations by outcome.
pub static MATCH_COMPUTATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reservation_match_computations_total",
        "Total number of suggestion queries",
        &["outcome"]
    )
    .expect("Failed to register MATCH_COMPUTATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reservation_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&SYNC_OPERATIONS);
    Lazy::force(&FEED_FETCH_DURATION);
    Lazy::force(&MATCH_COMPUTATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            String::new()
        }
    }
}

/// Record a sync run.
pub fn record_sync_run(scope: &str, status: &str) {
    SYNC_RUNS.with_label_values(&[scope, status]).inc();
}

/// Record a ledger mutation made by reconciliation.
pub fn record_sync_operation(operation: &str) {
    SYNC_OPERATIONS.with_label_values(&[operation]).inc();
}

/// Record a feed fetch duration.
pub fn record_feed_fetch(status: &str, duration_secs: f64) {
    FEED_FETCH_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record a suggestion query.
pub fn record_match_computation(outcome: &str) {
    MATCH_COMPUTATIONS.with_label_values(&[outcome]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
