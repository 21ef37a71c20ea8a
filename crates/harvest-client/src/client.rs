//! Rate-limited, retrying REST client.
//!
//! Production-grade client with:
//! - A shared rate gate across clones
//! - Per-call timeouts
//! - Exponential backoff on timeouts, 5xx and 429
//! - Observability (tracing spans, metrics, timeout telemetry)

use std::sync::Arc;
use std::time::Duration;

use harvest_models::{NetworkPhases, OperationType, TimeoutEvent};
use harvest_monitor::TimeoutMonitor;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, Params, RenderedRequest};
use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_gate_wait, record_request, record_retry};
use crate::rate_gate::RateGate;

/// Raw JSON payload returned by a successful call.
pub type Payload = serde_json::Value;

/// Outcome of one `fetch`: the payload, or the final error.
pub type FetchResult = Result<Payload, ApiError>;

/// REST API client.
///
/// Clones share the HTTP connection pool, the rate gate and the monitor.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    base_url: String,
    gate: Arc<RateGate>,
    monitor: Option<Arc<TimeoutMonitor>>,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.call_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("harvest-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::invalid_request(format!("failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let gate = Arc::new(RateGate::new(config.min_interval()));

        Ok(Self {
            http,
            config,
            base_url,
            gate,
            monitor: None,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Report timeouts and exhausted calls to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<TimeoutMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rate_gate(&self) -> &RateGate {
        &self.gate
    }

    /// Fetch an endpoint and deserialize the payload.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &Params,
    ) -> ApiResult<T> {
        let payload = self.fetch(endpoint, params).await?;
        serde_json::from_value(payload).map_err(|e| {
            ApiError::malformed(format!("{} payload did not match expected shape: {}", endpoint.name, e))
        })
    }

    /// Call an endpoint with rate gating and retries.
    ///
    /// Non-retryable failures return after the attempt that produced them;
    /// retryable ones are retried up to `max_attempts` in total and then
    /// reported as `ApiError::Exhausted`.
    pub async fn fetch(&self, endpoint: &Endpoint, params: &Params) -> FetchResult {
        let request = endpoint.render(params)?;
        let url = format!("{}{}", self.base_url, request.path);
        let max_attempts = self.config.max_attempts;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let span = info_span!(
                "api_call",
                endpoint = %endpoint.name,
                path = %request.path,
                attempt = attempt
            );

            let started = Instant::now();
            let result = self.attempt(&url, &request).instrument(span).await;
            let latency = started.elapsed();

            let status = match &result {
                Ok(_) => "200".to_string(),
                Err(e) => e.status_label(),
            };
            record_request(&endpoint.name, &status, latency.as_secs_f64() * 1000.0);

            let err = match result {
                Ok(payload) => {
                    if let Some(monitor) = &self.monitor {
                        monitor.record_success(1);
                    }
                    if attempt > 1 {
                        debug!(endpoint = %endpoint.name, attempt, "Call succeeded after retry");
                    }
                    return Ok(payload);
                }
                Err(e) => e,
            };

            if matches!(err, ApiError::Timeout(_)) {
                self.emit(
                    TimeoutEvent::new(OperationType::ClientCall, err.class(), 1, millis(latency))
                        .with_detail(format!("{} attempt {}", endpoint.name, attempt)),
                );
            }

            if !err.is_retryable() {
                debug!(endpoint = %endpoint.name, attempt, "Non-retryable failure: {}", err);
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(
                    endpoint = %endpoint.name,
                    attempts = attempt,
                    "Retries exhausted: {}",
                    err
                );
                // A final timeout was already reported above.
                if !matches!(err, ApiError::Timeout(_)) {
                    let mut event =
                        TimeoutEvent::new(OperationType::ClientCall, err.class(), 1, millis(latency))
                            .with_detail(format!("{} exhausted after {} attempts", endpoint.name, attempt));
                    if matches!(err, ApiError::Network(_)) {
                        event = event.with_phases(NetworkPhases {
                            connect_ms: Some(millis(latency)),
                            ..Default::default()
                        });
                    }
                    self.emit(event);
                }
                return Err(ApiError::Exhausted {
                    attempts: attempt,
                    class: err.class(),
                    message: err.to_string(),
                });
            }

            let delay = self
                .config
                .backoff
                .delay_with_hint(attempt, err.retry_after_ms().map(Duration::from_millis));
            warn!(
                endpoint = %endpoint.name,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "API call failed, retrying: {}",
                err
            );
            record_retry(&endpoint.name);
            tokio::time::sleep(delay).await;
        }
    }

    /// One gated, time-boxed attempt.
    async fn attempt(&self, url: &str, request: &RenderedRequest) -> ApiResult<Payload> {
        let waited = self.gate.acquire().await;
        if !waited.is_zero() {
            record_gate_wait(waited.as_secs_f64() * 1000.0);
        }

        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, self.send(url, request)).await {
            Ok(Err(ApiError::Timeout(_))) | Err(_) => Err(ApiError::Timeout(millis(timeout))),
            Ok(result) => result,
        }
    }

    async fn send(&self, url: &str, request: &RenderedRequest) -> ApiResult<Payload> {
        let response = self.http.get(url).query(&request.query).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            if body.is_empty() {
                return Ok(Payload::Null);
            }
            return serde_json::from_slice(&body).map_err(|e| {
                ApiError::malformed(format!(
                    "invalid JSON from {}: {} (body prefix: {})",
                    url,
                    e,
                    String::from_utf8_lossy(&body[..body.len().min(200)])
                ))
            });
        }

        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_http_status(
            status.as_u16(),
            format!("{} failed: {}", url, body),
            retry_after_ms,
        ))
    }

    fn emit(&self, event: TimeoutEvent) {
        if let Some(monitor) = &self.monitor {
            monitor.record_timeout(event);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig {
            requests_per_second: -1.0,
            ..Default::default()
        };
        assert!(ApiClient::new(config).is_err());

        let config = ClientConfig {
            requests_per_second: 1e-20,
            ..Default::default()
        };
        assert!(matches!(ApiClient::new(config), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_clones_share_rate_gate() {
        let client = ApiClient::new(ClientConfig::default()).unwrap();
        let clone = client.clone();
        assert!(std::ptr::eq(client.rate_gate(), clone.rate_gate()));
        assert_eq!(client.rate_gate().interval(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_invalid_params_fail_without_network() {
        let client = ApiClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap();
        let endpoint = Endpoint::new("despesas", "/deputados/{id}/despesas");
        let err = client.fetch(&endpoint, &Params::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
