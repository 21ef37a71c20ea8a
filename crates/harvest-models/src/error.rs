//! Validation errors raised before anything reaches the network.

use thiserror::Error;

/// A document path that cannot address a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' has an empty segment at position {position}")]
    EmptySegment { path: String, position: usize },

    #[error("Path '{path}' has {segments} segments; a document path needs an even count")]
    OddSegments { path: String, segments: usize },
}

/// A write operation rejected at the enqueue boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Payload for {kind} must be a map, got {found}")]
    PayloadNotMap { kind: &'static str, found: &'static str },

    #[error("Delete operations carry no payload, got {0}")]
    PayloadOnDelete(&'static str),

    #[error("Unsupported payload value: {0}")]
    UnsupportedValue(String),
}
