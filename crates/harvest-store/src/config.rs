//! Writer configuration.

use std::time::Duration;

use harvest_models::BackoffSchedule;

use crate::sink::MAX_BATCH_WRITES;

/// Batch writer configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Pending count that triggers an auto-commit.
    pub max_operations: usize,
    /// Individual retries for a failed write or chunk.
    pub max_retries: u32,
    /// Delay schedule between retries.
    pub backoff: BackoffSchedule,
    /// Deadline of a single sink call.
    pub commit_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_operations: MAX_BATCH_WRITES,
            max_retries: 3,
            backoff: BackoffSchedule::default(),
            commit_timeout: Duration::from_secs(60),
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_operations: usize = std::env::var("HARVEST_BATCH_MAX_OPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_operations);

        let max_retries: u32 = std::env::var("HARVEST_BATCH_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_retries);

        let backoff_base_ms: u64 = std::env::var("HARVEST_BATCH_BACKOFF_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.backoff.base.as_millis() as u64);

        let commit_timeout_secs: u64 = std::env::var("HARVEST_COMMIT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Self {
            max_operations: max_operations.clamp(1, MAX_BATCH_WRITES),
            max_retries,
            backoff: BackoffSchedule::new(Duration::from_millis(backoff_base_ms), defaults.backoff.max),
            commit_timeout: Duration::from_secs(commit_timeout_secs),
        }
    }
}
