//! Batched persistence for harvested documents.
//!
//! This crate provides:
//! - `BatchWriter`: auto-committing write queue with per-operation retry
//! - `DocumentSink`: the store seam, with Firestore and in-memory sinks
//! - Service account authentication via gcp_auth

pub mod auth;
pub mod config;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod metrics;
pub mod sink;
pub mod types;
pub mod writer;

pub use auth::{ServiceAccountToken, StaticToken, TokenSource};
pub use config::BatchConfig;
pub use error::{StoreError, StoreResult, WriteError, WriteResult};
pub use firestore::{FirestoreConfig, FirestoreSink};
pub use memory::MemorySink;
pub use sink::{DocumentSink, WriteStatus, MAX_BATCH_WRITES};
pub use writer::{BatchWriter, DeadLetter, WriterPhase};
