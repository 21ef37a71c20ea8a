//! API client error types.

use harvest_models::ErrorClass;
use thiserror::Error;

/// Result type for API client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by `ApiClient`.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited (HTTP 429): {message}")]
    RateLimited {
        retry_after_ms: Option<u64>,
        message: String,
    },

    #[error("Request rejected with {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Gave up after {attempts} attempts ({class}): {message}")]
    Exhausted {
        attempts: u32,
        class: ErrorClass,
        message: String,
    },
}

impl ApiError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Map an unsuccessful HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        let message = body.into();
        match status {
            429 => Self::RateLimited {
                retry_after_ms,
                message,
            },
            408 => Self::Timeout(0),
            500..=599 => Self::Server { status, message },
            400..=499 => Self::Client { status, message },
            _ => Self::Malformed(format!("unexpected status {}: {}", status, message)),
        }
    }

    /// Failure classification shared with the monitor.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Timeout(_) => ErrorClass::Timeout,
            ApiError::Network(_) => ErrorClass::Network,
            ApiError::Server { .. } => ErrorClass::ServerError,
            ApiError::RateLimited { .. } => ErrorClass::RateLimited,
            ApiError::Client { .. } => ErrorClass::ClientError,
            ApiError::Malformed(_) => ErrorClass::Malformed,
            ApiError::InvalidRequest(_) => ErrorClass::Validation,
            ApiError::Exhausted { class, .. } => *class,
        }
    }

    /// Check if another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Exhausted { .. } => false,
            other => other.class().is_retryable(),
        }
    }

    /// Server-requested wait before retrying.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Short label for metrics.
    pub fn status_label(&self) -> String {
        match self.http_status() {
            Some(status) => status.to_string(),
            None => self.class().as_str().to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(0)
        } else if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_http_status(status.as_u16(), err.to_string(), None)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_http_status_429() {
        let err = ApiError::from_http_status(429, "slow down", Some(2000));
        assert!(matches!(err, ApiError::RateLimited { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_ms(), Some(2000));
        assert_eq!(err.http_status(), Some(429));
    }

    #[test]
    fn test_error_from_http_status_5xx() {
        for status in [500, 502, 503, 504] {
            let err = ApiError::from_http_status(status, "oops", None);
            assert_eq!(err.class(), ErrorClass::ServerError);
            assert!(err.is_retryable(), "{} should be retryable", status);
        }
    }

    #[test]
    fn test_error_from_http_status_4xx() {
        for status in [400, 401, 403, 404, 422] {
            let err = ApiError::from_http_status(status, "nope", None);
            assert_eq!(err.class(), ErrorClass::ClientError);
            assert!(!err.is_retryable(), "{} should not be retryable", status);
        }
    }

    #[test]
    fn test_request_timeout_status_is_retryable() {
        let err = ApiError::from_http_status(408, "", None);
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_malformed_and_invalid_not_retryable() {
        assert!(!ApiError::malformed("bad json").is_retryable());
        assert!(!ApiError::invalid_request("missing id").is_retryable());
    }

    #[test]
    fn test_exhausted_keeps_class_but_stops_retry() {
        let err = ApiError::Exhausted {
            attempts: 4,
            class: ErrorClass::ServerError,
            message: "Server error 503: down".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::ServerError);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("4 attempts"));
    }

    #[test]
    fn test_status_label() {
        assert_eq!(ApiError::Timeout(5).status_label(), "timeout");
        assert_eq!(ApiError::from_http_status(404, "", None).status_label(), "404");
    }
}
