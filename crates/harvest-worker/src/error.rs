//! Worker error types.

use harvest_client::ApiError;
use harvest_models::{ErrorClass, PathError, ValidationError, WriteTotals};
use harvest_store::{StoreError, WriteError};
use thiserror::Error;

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Failure of a single work item.
///
/// `Failed` is recorded in the run result and the run continues; `Fatal`
/// aborts the run.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    #[error("{message}")]
    Failed {
        message: String,
        class: Option<ErrorClass>,
    },

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl ItemError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
            class: None,
        }
    }

    pub fn classified(class: ErrorClass, msg: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
            class: Some(class),
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ItemError::Fatal(_))
    }

    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ItemError::Failed { class, .. } => *class,
            ItemError::Fatal(_) => None,
        }
    }
}

impl From<ApiError> for ItemError {
    fn from(e: ApiError) -> Self {
        Self::classified(e.class(), e.to_string())
    }
}

impl From<WriteError> for ItemError {
    fn from(e: WriteError) -> Self {
        Self::classified(ErrorClass::Validation, e.to_string())
    }
}

impl From<PathError> for ItemError {
    fn from(e: PathError) -> Self {
        Self::classified(ErrorClass::Validation, e.to_string())
    }
}

impl From<ValidationError> for ItemError {
    fn from(e: ValidationError) -> Self {
        Self::classified(ErrorClass::Validation, e.to_string())
    }
}

/// Errors that abort an orchestrator run.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("Run aborted by item '{item}': {message}")]
    Fatal {
        item: String,
        message: String,
        /// Writes committed before the abort, final flush included.
        writes: WriteTotals,
    },
}

/// Top-level errors of a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl HarvestError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
