//! Monitor configuration and analysis policy.

use std::time::Duration;

/// Thresholds used by the analysis heuristics.
///
/// These are policy, not constants: tune them per deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisThresholds {
    /// Timeout count within the window above which batch sizes should shrink.
    pub high_timeout_count: usize,
    /// Timeout rate above which batch sizes should shrink even with few events.
    pub high_timeout_rate: f64,
    /// Average event duration above which timeouts/retries should be tightened.
    pub high_avg_duration_ms: f64,
    /// Name resolution / balancer / connect latency considered abnormal.
    pub slow_network_phase_ms: u64,
    /// Share of network-class events that flags a connectivity problem.
    pub network_error_share: f64,
    /// Share of rate-limited events that suggests lowering the request rate.
    pub rate_limited_share: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            high_timeout_count: 5,
            high_timeout_rate: 0.2,
            high_avg_duration_ms: 10_000.0,
            slow_network_phase_ms: 1_000,
            network_error_share: 0.5,
            rate_limited_share: 0.3,
        }
    }
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Ring buffer capacity
    pub capacity: usize,
    /// Window used by `analyze(None)`
    pub default_window: Duration,
    /// Heuristic thresholds
    pub thresholds: AnalysisThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            default_window: Duration::from_secs(3600),
            thresholds: AnalysisThresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: std::env::var("HARVEST_MONITOR_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.capacity),
            default_window: Duration::from_secs(
                std::env::var("HARVEST_MONITOR_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            thresholds: AnalysisThresholds {
                high_timeout_count: std::env::var("HARVEST_MONITOR_HIGH_TIMEOUTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.thresholds.high_timeout_count),
                high_avg_duration_ms: std::env::var("HARVEST_MONITOR_HIGH_AVG_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.thresholds.high_avg_duration_ms),
                ..defaults.thresholds
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("HARVEST_MONITOR_CAPACITY");
        std::env::remove_var("HARVEST_MONITOR_WINDOW_SECS");
        let config = MonitorConfig::from_env();
        assert_eq!(config.capacity, 1_000);
        assert_eq!(config.default_window, Duration::from_secs(3600));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_capacity() {
        std::env::set_var("HARVEST_MONITOR_CAPACITY", "0");
        let config = MonitorConfig::from_env();
        assert_eq!(config.capacity, 1_000);
        std::env::remove_var("HARVEST_MONITOR_CAPACITY");
    }
}
