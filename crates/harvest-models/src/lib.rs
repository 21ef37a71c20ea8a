//! Shared data models for the harvest ingestion pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Document payloads (`DocValue`) and store paths
//! - Write operations and batch commit outcomes
//! - Timeout telemetry events
//! - Orchestrator run results
//! - Backoff arithmetic shared by the API client and the batch writer

pub mod backoff;
pub mod commit;
pub mod error;
pub mod event;
pub mod path;
pub mod processing;
pub mod value;
pub mod write;

// Re-export common types
pub use backoff::BackoffSchedule;
pub use commit::{BatchCommitResult, FailedWrite};
pub use error::{PathError, ValidationError};
pub use event::{ErrorClass, NetworkPhases, OperationType, TimeoutEvent};
pub use path::DocumentPath;
pub use processing::{ItemDetail, ItemStatus, LatencySummary, ProcessingResult, WriteTotals};
pub use value::DocValue;
pub use write::{OperationId, WriteKind, WriteOperation, WriteOptions};
