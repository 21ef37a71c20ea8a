//! Harvest worker.
//!
//! This crate provides:
//! - A bounded-concurrency orchestrator with sub-work and cancellation
//! - The harvest pipeline from API pages to document writes
//! - Run logging and configuration
//! - The `harvest-worker` binary

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;

pub use config::{HarvestConfig, OrchestratorConfig, SinkKind};
pub use error::{HarvestError, HarvestResult, ItemError, OrchestratorError};
pub use logging::RunLogger;
pub use orchestrator::{CancelHandle, ItemOutcome, Orchestrator, WorkContext, WorkItem};
pub use pipeline::{run_harvest, HarvestReport, HarvestTask, Harvester};
