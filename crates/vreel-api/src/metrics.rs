//! Prometheus metrics for the webhook server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, BuildError};
use std::time::Instant;

/// Install the Prometheus recorder and return a handle for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vreel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vreel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vreel_http_requests_in_flight";

    // Webhook metrics
    pub const WEBHOOKS_TOTAL: &str = "vreel_webhooks_total";
}

/// Paths reported as-is; everything else is folded into one label.
const KNOWN_PATHS: [&str; 5] = ["/webhooks/render", "/webhooks/final", "/health", "/healthz", "/metrics"];

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a handled webhook.
pub fn record_webhook(stage: &'static str, outcome: &'static str) {
    counter!(names::WEBHOOKS_TOTAL, "stage" => stage, "outcome" => outcome).increment(1);
}

/// Keep path labels bounded: scanners hitting random URLs share one series.
fn sanitize_path(path: &str) -> &str {
    KNOWN_PATHS
        .iter()
        .find(|known| **known == path)
        .copied()
        .unwrap_or("/:unmatched")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/webhooks/final"), "/webhooks/final");
        assert_eq!(sanitize_path("/wp-admin/setup.php"), "/:unmatched");
        assert_eq!(sanitize_path("/webhooks/render/extra"), "/:unmatched");
    }
}
