//! Timeout and failure telemetry.
//!
//! This crate provides:
//! - A bounded ring buffer of `TimeoutEvent`s fed by the API client and the batch writer
//! - Success counters for computing a timeout rate
//! - Windowed analysis with advisory recommendations
//!
//! The monitor never changes any component's configuration; a controller
//! may read `Analysis` and decide what to adapt.

pub mod analysis;
pub mod config;
pub mod monitor;

pub use analysis::{Analysis, Recommendation};
pub use config::{AnalysisThresholds, MonitorConfig};
pub use monitor::TimeoutMonitor;
