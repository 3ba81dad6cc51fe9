//! Firestore metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "vreel_firestore_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vreel_firestore_latency_seconds";

    /// Optimistic-concurrency conflicts by collection.
    pub const PRECONDITION_CONFLICTS_TOTAL: &str = "vreel_firestore_precondition_conflicts_total";
}

/// Record metrics for a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a lost precondition race.
pub fn record_precondition_conflict(collection: &str) {
    counter!(
        names::PRECONDITION_CONFLICTS_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(1);
}
