//! Failure and timeout telemetry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of operation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    ClientCall,
    BatchCommit,
    Query,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::ClientCall => "client_call",
            OperationType::BatchCommit => "batch_commit",
            OperationType::Query => "query",
        }
    }
}

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Deadline elapsed before a response arrived.
    Timeout,
    /// Connection-level failure.
    Network,
    /// HTTP 5xx or equivalent.
    ServerError,
    /// HTTP 429 or quota exhaustion.
    RateLimited,
    /// HTTP 4xx other than 429.
    ClientError,
    /// Response body could not be understood.
    Malformed,
    /// Request rejected locally before being sent.
    Validation,
    /// Some writes of a batch failed.
    PartialCommit,
}

impl ErrorClass {
    /// Whether failures of this class are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::Timeout
                | ErrorClass::Network
                | ErrorClass::ServerError
                | ErrorClass::RateLimited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Network => "network",
            ErrorClass::ServerError => "server_error",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ClientError => "client_error",
            ErrorClass::Malformed => "malformed",
            ErrorClass::Validation => "validation",
            ErrorClass::PartialCommit => "partial_commit",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase network latencies, when the producer can observe them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPhases {
    /// Name resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_ms: Option<u64>,
    /// Load-balancer pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_pick_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_byte_ms: Option<u64>,
}

impl NetworkPhases {
    /// Largest latency among the pre-request phases (resolution, balancing, connect).
    pub fn worst_setup_ms(&self) -> Option<u64> {
        [self.dns_ms, self.lb_pick_ms, self.connect_ms]
            .into_iter()
            .flatten()
            .max()
    }
}

/// A recorded failure or timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutEvent {
    pub timestamp: DateTime<Utc>,
    pub operation_type: OperationType,
    /// Number of logical operations affected (1 for a call, batch size for a commit).
    pub operation_count: u64,
    pub duration_ms: u64,
    pub error_class: ErrorClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_phases: Option<NetworkPhases>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TimeoutEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        operation_type: OperationType,
        error_class: ErrorClass,
        operation_count: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation_type,
            operation_count,
            duration_ms,
            error_class,
            network_phases: None,
            detail: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_phases(mut self, phases: NetworkPhases) -> Self {
        self.network_phases = Some(phases);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
