//! API client configuration.

use std::time::Duration;

use harvest_models::BackoffSchedule;

use crate::error::{ApiError, ApiResult};

/// Longest spacing the rate gate will enforce between two calls.
pub const MAX_REQUEST_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Rate gate: minimum spacing between calls is 1000/rps ms
    pub requests_per_second: f64,
    /// Total attempts per call, first one included
    pub max_attempts: u32,
    /// Delay schedule between attempts
    pub backoff: BackoffSchedule,
    /// Per-call timeout (one attempt)
    pub call_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dadosabertos.camara.leg.br/api/v2".to_string(),
            requests_per_second: 5.0,
            max_attempts: 4,
            backoff: BackoffSchedule::default(),
            call_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("HARVEST_API_BASE_URL").unwrap_or(defaults.base_url),
            requests_per_second: std::env::var("HARVEST_API_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.requests_per_second),
            max_attempts: std::env::var("HARVEST_API_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            backoff: BackoffSchedule::new(
                Duration::from_millis(
                    std::env::var("HARVEST_API_BACKOFF_BASE_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(500),
                ),
                Duration::from_millis(
                    std::env::var("HARVEST_API_BACKOFF_MAX_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(30_000),
                ),
            ),
            call_timeout: Duration::from_secs(
                std::env::var("HARVEST_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("HARVEST_API_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> ApiResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ApiError::invalid_request("base URL cannot be empty"));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ApiError::invalid_request(format!("invalid base URL '{}': {}", self.base_url, e)))?;

        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ApiError::invalid_request(format!(
                "requests per second must be positive, got {}",
                self.requests_per_second
            )));
        }
        if self.requests_per_second < 1.0 / MAX_REQUEST_INTERVAL.as_secs_f64() {
            return Err(ApiError::invalid_request(format!(
                "requests per second {} is below one request per {}s",
                self.requests_per_second,
                MAX_REQUEST_INTERVAL.as_secs()
            )));
        }
        if self.max_attempts == 0 {
            return Err(ApiError::invalid_request("max attempts must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(ApiError::invalid_request("call timeout must be non-zero"));
        }
        Ok(())
    }

    /// Minimum spacing between two calls.
    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.requests_per_second)
            .unwrap_or(MAX_REQUEST_INTERVAL)
            .min(MAX_REQUEST_INTERVAL)
    }
}
