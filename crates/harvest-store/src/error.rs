//! Store error types.

use harvest_models::{ErrorClass, PathError, ValidationError};
use thiserror::Error;

/// Result type for sink calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for writer calls.
pub type WriteResult<T> = Result<T, WriteError>;

/// Errors that fail a whole sink call.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Commit timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after_ms: Option<u64>,
        message: String,
    },

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Request failed with {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Batch of {size} writes exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

impl StoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            408 => Self::Timeout(0),
            429 => Self::RateLimited {
                retry_after_ms,
                message,
            },
            500..=599 => Self::ServerError { status, message },
            _ => Self::RequestFailed { status, message },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Timeout(_) => ErrorClass::Timeout,
            StoreError::Network(_) => ErrorClass::Network,
            StoreError::RateLimited { .. } => ErrorClass::RateLimited,
            StoreError::ServerError { .. } => ErrorClass::ServerError,
            StoreError::Auth(_) | StoreError::RequestFailed { .. } => ErrorClass::ClientError,
            StoreError::InvalidResponse(_) => ErrorClass::Malformed,
            StoreError::BatchTooLarge { .. } => ErrorClass::Validation,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            StoreError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            StoreError::RateLimited { .. } => Some(429),
            StoreError::ServerError { status, .. } | StoreError::RequestFailed { status, .. } => {
                Some(*status)
            }
            StoreError::Auth(_) => Some(401),
            StoreError::Timeout(_) => Some(408),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::Timeout(0)
        } else if e.is_decode() {
            StoreError::InvalidResponse(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidResponse(e.to_string())
    }
}

/// A write rejected at the enqueue boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Invalid(ValidationError),
}

impl From<ValidationError> for WriteError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Path(path) => WriteError::Path(path),
            other => WriteError::Invalid(other),
        }
    }
}
