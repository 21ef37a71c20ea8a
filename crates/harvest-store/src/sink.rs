//! The document-store collaborator.

use async_trait::async_trait;
use harvest_models::{ErrorClass, WriteOperation};

use crate::error::StoreResult;

/// Firestore's limit on writes per `batchWrite` call.
pub const MAX_BATCH_WRITES: usize = 500;

/// Per-operation outcome of a sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteStatus {
    Applied,
    Rejected { class: ErrorClass, message: String },
}

impl WriteStatus {
    pub fn rejected(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Rejected {
            class,
            message: message.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, WriteStatus::Applied)
    }
}

/// A store that applies path-addressed writes.
///
/// Writes in one call are applied independently: the call returns one status
/// per operation, in order. `Err` means the call as a whole failed and no
/// status is known for any operation.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn commit(&self, ops: &[WriteOperation]) -> StoreResult<Vec<WriteStatus>>;

    /// Largest number of operations accepted in one call.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_WRITES
    }

    fn name(&self) -> &'static str;
}
