//! API client metrics.
//!
//! - Request counters by endpoint and status
//! - Latency histograms
//! - Retry counters and rate gate waits

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total API requests by endpoint and status.
    pub const REQUESTS_TOTAL: &str = "harvest_api_requests_total";

    /// Total retry attempts by endpoint.
    pub const RETRIES_TOTAL: &str = "harvest_api_retries_total";

    /// Request latency in seconds by endpoint.
    pub const LATENCY_SECONDS: &str = "harvest_api_latency_seconds";

    /// Time spent waiting on the rate gate.
    pub const GATE_WAIT_SECONDS: &str = "harvest_api_gate_wait_seconds";
}

/// Record metrics for one completed attempt.
pub fn record_request(endpoint: &str, status: &str, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "endpoint" => endpoint.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(endpoint: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

pub fn record_gate_wait(wait_ms: f64) {
    histogram!(names::GATE_WAIT_SECONDS).record(wait_ms / 1000.0);
}
