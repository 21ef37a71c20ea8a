//! Orchestrator metrics.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{HarvestError, HarvestResult};

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: &str) -> HarvestResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| HarvestError::config_error(format!("invalid metrics address '{}': {}", addr, e)))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| HarvestError::config_error(format!("failed to install Prometheus exporter: {}", e)))
}

/// Metric name constants for consistency.
pub mod names {
    /// Finished work items by outcome (`success`, `failure`).
    pub const ITEMS_TOTAL: &str = "harvest_items_total";

    /// Work item duration in seconds.
    pub const ITEM_DURATION_SECONDS: &str = "harvest_item_duration_seconds";

    /// Callbacks currently running.
    pub const ITEMS_IN_FLIGHT: &str = "harvest_items_in_flight";
}

pub fn record_item(success: bool, duration_ms: u64) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::ITEMS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::ITEM_DURATION_SECONDS).record(duration_ms as f64 / 1000.0);
}

pub fn record_in_flight(count: usize) {
    gauge!(names::ITEMS_IN_FLIGHT).set(count as f64);
}
