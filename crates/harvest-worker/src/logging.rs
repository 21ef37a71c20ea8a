//! Structured run logging.
//!
//! Every lifecycle line of a run carries the same `run_id` and `operation`
//! fields so a run can be followed through JSON logs.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

/// Run logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
}

impl RunLogger {
    /// Logger for a new run with a generated id.
    pub fn new(operation: &str) -> Self {
        Self::with_run_id(&Uuid::new_v4().to_string(), operation)
    }

    pub fn with_run_id(run_id: &str, operation: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span for instrumenting the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_generates_ids() {
        let a = RunLogger::new("harvest");
        let b = RunLogger::new("harvest");

        assert_eq!(a.operation(), "harvest");
        assert!(Uuid::parse_str(a.run_id()).is_ok());
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_run_logger_with_run_id() {
        let logger = RunLogger::with_run_id("run-123", "list");

        assert_eq!(logger.run_id(), "run-123");
        assert_eq!(logger.operation(), "list");
    }
}
