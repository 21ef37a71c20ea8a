//! Firestore REST sink.
//!
//! - `documents:batchWrite` with one status per write
//! - Token refresh on `ACCESS_TOKEN_EXPIRED`
//! - Emulator support via `FIRESTORE_EMULATOR_HOST`
//! - Observability (tracing spans, metrics)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harvest_models::{DocumentPath, WriteOperation};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

use crate::auth::{ServiceAccountToken, StaticToken, TokenSource};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::sink::{DocumentSink, WriteStatus, MAX_BATCH_WRITES};
use crate::types::{BatchWriteRequest, BatchWriteResponse, Write};

// =============================================================================
// Configuration
// =============================================================================

/// Firestore sink configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a local emulator
    pub emulator_host: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: None,
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                StoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(StoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let timeout_secs: u64 = std::env::var("HARVEST_COMMIT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }

    /// Resource prefix of every document name.
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    pub fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}/v1/{}", host, self.documents_root()),
            None => format!("https://firestore.googleapis.com/v1/{}", self.documents_root()),
        }
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Firestore REST API sink.
#[derive(Clone)]
pub struct FirestoreSink {
    http: Client,
    base_url: String,
    documents_root: String,
    tokens: Arc<dyn TokenSource>,
}

impl FirestoreSink {
    pub fn new(config: FirestoreConfig, tokens: Arc<dyn TokenSource>) -> StoreResult<Self> {
        let base_url = config.base_url();
        Self::with_base_url(config, tokens, base_url)
    }

    /// Send requests to `base_url` instead of the configured endpoint.
    pub fn with_base_url(
        config: FirestoreConfig,
        tokens: Arc<dyn TokenSource>,
        base_url: impl Into<String>,
    ) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("harvest-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::from)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            documents_root: config.documents_root(),
            tokens,
        })
    }

    /// Create from environment variables.
    ///
    /// The emulator accepts any bearer token; otherwise a service account
    /// is required.
    pub fn from_env() -> StoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        let tokens: Arc<dyn TokenSource> = if config.emulator_host.is_some() {
            Arc::new(StaticToken::new("owner"))
        } else {
            Arc::new(ServiceAccountToken::from_env()?)
        };
        Self::new(config, tokens)
    }

    /// Full resource name of a document.
    pub fn document_name(&self, path: &DocumentPath) -> String {
        format!("{}/{}", self.documents_root, path)
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    async fn post_batch(&self, request: &BatchWriteRequest) -> StoreResult<BatchWriteResponse> {
        let url = format!("{}:batchWrite", self.base_url);

        let mut token = self.tokens.token().await?;
        let mut response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(request)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            if !Self::is_access_token_expired(&body) {
                return Err(StoreError::from_http_status(401, format!("{} failed: {}", url, body), None));
            }
            debug!("Access token expired, refreshing");
            self.tokens.invalidate().await;
            token = self.tokens.token().await?;
            response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .json(request)
                .send()
                .await?;
        }

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response.json().await?);
        }

        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_http_status(
            status.as_u16(),
            format!("{} failed: {}", url, body),
            retry_after_ms,
        ))
    }
}

#[async_trait]
impl DocumentSink for FirestoreSink {
    async fn commit(&self, ops: &[WriteOperation]) -> StoreResult<Vec<WriteStatus>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        if ops.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                max: MAX_BATCH_WRITES,
            });
        }

        let request = BatchWriteRequest {
            writes: ops
                .iter()
                .map(|op| Write::from_operation(op, self.document_name(&op.path)))
                .collect(),
        };

        let span = info_span!("firestore_request", operation = "batch_write", writes = ops.len());
        let start = Instant::now();
        let result = self.post_batch(&request).instrument(span).await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request("batch_write", status, start.elapsed().as_secs_f64() * 1000.0);

        let statuses = result?.status.unwrap_or_default();
        if statuses.is_empty() {
            return Ok(vec![WriteStatus::Applied; ops.len()]);
        }
        if statuses.len() != ops.len() {
            return Err(StoreError::invalid_response(format!(
                "batchWrite returned {} statuses for {} writes",
                statuses.len(),
                ops.len()
            )));
        }

        Ok(statuses
            .into_iter()
            .map(|s| {
                if s.is_ok() {
                    WriteStatus::Applied
                } else {
                    let message = s.message.clone().unwrap_or_else(|| "Unknown error".to_string());
                    WriteStatus::rejected(s.class(), format!("{} (code {})", message, s.code.unwrap_or(0)))
                }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_emulator_base_url() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        let config = FirestoreConfig::from_env().unwrap();
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::remove_var("GCP_PROJECT_ID");

        assert_eq!(
            config.base_url(),
            "http://localhost:8080/v1/projects/test-project/databases/(default)/documents"
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_document_name() {
        let sink = FirestoreSink::new(
            FirestoreConfig::new("p"),
            Arc::new(StaticToken::new("t")),
        )
        .unwrap();
        let path = DocumentPath::parse("deputados/1/despesas/9").unwrap();
        assert_eq!(
            sink.document_name(&path),
            "projects/p/databases/(default)/documents/deputados/1/despesas/9"
        );
    }
}
