//! Store metrics collection.
//!
//! - Sink request counters by operation and status
//! - Commit and operation outcome counters
//! - Commit latency histograms
//! - Per-operation retry counters

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total sink requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "harvest_store_requests_total";

    /// Sink request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "harvest_store_latency_seconds";

    /// Writer commits by outcome (`success`, `partial`, `failed`).
    pub const BATCH_COMMITS_TOTAL: &str = "harvest_batch_commits_total";

    /// Individual write operations by outcome (`succeeded`, `failed`).
    pub const BATCH_OPS_TOTAL: &str = "harvest_batch_ops_total";

    /// Wall time of a full `commit()` in seconds.
    pub const COMMIT_LATENCY_SECONDS: &str = "harvest_batch_commit_latency_seconds";

    /// Individual retries of failed writes and chunks.
    pub const RETRIES_TOTAL: &str = "harvest_batch_retries_total";

    /// Operations waiting in the writer queue.
    pub const PENDING_OPS: &str = "harvest_batch_pending_ops";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed sink request.
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

/// Record the outcome of one writer commit.
pub fn record_commit(succeeded: usize, failed: usize, elapsed_ms: u64) {
    let outcome = match (succeeded, failed) {
        (_, 0) => "success",
        (0, _) => "failed",
        _ => "partial",
    };
    counter!(names::BATCH_COMMITS_TOTAL, "outcome" => outcome).increment(1);
    counter!(names::BATCH_OPS_TOTAL, "outcome" => "succeeded").increment(succeeded as u64);
    counter!(names::BATCH_OPS_TOTAL, "outcome" => "failed").increment(failed as u64);
    histogram!(names::COMMIT_LATENCY_SECONDS).record(elapsed_ms as f64 / 1000.0);
}

/// Record a retry of `scope` (`chunk` or `operation`).
pub fn record_retry(scope: &'static str) {
    counter!(names::RETRIES_TOTAL, "scope" => scope).increment(1);
}

pub fn record_pending(pending: usize) {
    gauge!(names::PENDING_OPS).set(pending as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.contains("requests"));
        assert!(names::BATCH_COMMITS_TOTAL.starts_with("harvest_batch"));
        assert!(names::COMMIT_LATENCY_SECONDS.ends_with("_seconds"));
    }
}
