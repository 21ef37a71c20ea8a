//! Client for rate-limited external REST APIs.
//!
//! This crate provides:
//! - Endpoint templates with named placeholders and default query parameters
//! - A process-wide rate gate enforcing minimum spacing between calls
//! - Exponential backoff retries with retryable/non-retryable classification
//! - Timeout and exhaustion telemetry fed to a `TimeoutMonitor`
//! - Pagination helpers for `{items, links}` shaped payloads

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod page;
pub mod rate_gate;

pub use client::{ApiClient, FetchResult, Payload};
pub use config::{ClientConfig, MAX_REQUEST_INTERVAL};
pub use endpoint::{Endpoint, Params, RenderedRequest};
pub use error::{ApiError, ApiResult};
pub use page::{Page, PAGE_PARAM};
pub use rate_gate::RateGate;
