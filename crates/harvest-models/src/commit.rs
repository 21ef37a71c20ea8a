//! Batch commit outcomes.

use serde::{Deserialize, Serialize};

use crate::event::ErrorClass;
use crate::path::DocumentPath;
use crate::write::OperationId;

/// A write that could not be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedWrite {
    pub id: OperationId,
    pub path: DocumentPath,
    pub error: String,
    pub class: ErrorClass,
    /// Attempts made, including individual retries.
    pub attempts: u32,
}

/// Outcome of one `commit()`.
///
/// `succeeded + failed == attempted` always holds; the constructor is the
/// only way to build one with a non-zero count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchCommitResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub failed_operation_ids: Vec<OperationId>,
    pub failures: Vec<FailedWrite>,
    /// Operations that needed an individual retry (successful or not).
    pub retried: usize,
}

impl BatchCommitResult {
    /// Result of committing nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(succeeded: usize, failures: Vec<FailedWrite>, retried: usize, elapsed_ms: u64) -> Self {
        let failed = failures.len();
        Self {
            attempted: succeeded + failed,
            succeeded,
            failed,
            elapsed_ms,
            failed_operation_ids: failures.iter().map(|f| f.id.clone()).collect(),
            failures,
            retried,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Fold another result into this one (used when a commit spans several sink calls).
    pub fn merge(&mut self, other: BatchCommitResult) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.elapsed_ms += other.elapsed_ms;
        self.retried += other.retried;
        self.failed_operation_ids.extend(other.failed_operation_ids);
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str) -> FailedWrite {
        FailedWrite {
            id: OperationId::from_string(id),
            path: DocumentPath::parse("a/b").unwrap(),
            error: "boom".to_string(),
            class: ErrorClass::ServerError,
            attempts: 4,
        }
    }

    #[test]
    fn test_counts_are_consistent() {
        let result = BatchCommitResult::new(8, vec![failure("x"), failure("y")], 2, 120);
        assert_eq!(result.attempted, 10);
        assert_eq!(result.succeeded + result.failed, result.attempted);
        assert_eq!(
            result.failed_operation_ids,
            vec![OperationId::from_string("x"), OperationId::from_string("y")]
        );
        assert!(!result.is_success());
    }

    #[test]
    fn test_merge() {
        let mut total = BatchCommitResult::new(500, vec![], 0, 100);
        total.merge(BatchCommitResult::new(9, vec![failure("z")], 1, 30));
        assert_eq!(total.attempted, 510);
        assert_eq!(total.failed, 1);
        assert_eq!(total.elapsed_ms, 130);
        assert_eq!(total.succeeded + total.failed, total.attempted);
    }
}
