//! Write operations queued for the document store.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::path::DocumentPath;
use crate::value::DocValue;

/// Unique identifier for a queued write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    /// Generate a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    /// Create or overwrite the whole document.
    Set,
    /// Update the given fields of an existing document.
    Update,
    /// Delete the document.
    Delete,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Set => "set",
            WriteKind::Update => "update",
            WriteKind::Delete => "delete",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-write options understood by the sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// For `Set`: only touch the fields present in the payload.
    #[serde(default)]
    pub merge: bool,
    /// Precondition on document existence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

/// A single write against a document path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    pub id: OperationId,
    pub kind: WriteKind,
    pub path: DocumentPath,
    pub payload: DocValue,
    #[serde(default)]
    pub options: WriteOptions,
}

impl WriteOperation {
    /// Build and validate a write from a raw path.
    pub fn new(kind: WriteKind, path: &str, payload: DocValue) -> Result<Self, ValidationError> {
        let path = DocumentPath::parse(path)?;
        Self::at(kind, path, payload)
    }

    /// Build and validate a write against an already-parsed path.
    pub fn at(kind: WriteKind, path: DocumentPath, payload: DocValue) -> Result<Self, ValidationError> {
        let op = Self {
            id: OperationId::new(),
            kind,
            path,
            payload,
            options: WriteOptions::default(),
        };
        op.validate()?;
        Ok(op)
    }

    pub fn set(path: &str, payload: DocValue) -> Result<Self, ValidationError> {
        Self::new(WriteKind::Set, path, payload)
    }

    pub fn update(path: &str, payload: DocValue) -> Result<Self, ValidationError> {
        Self::new(WriteKind::Update, path, payload)
    }

    pub fn delete(path: &str) -> Result<Self, ValidationError> {
        Self::new(WriteKind::Delete, path, DocValue::Null)
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Check payload shape against the write kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            WriteKind::Set | WriteKind::Update => {
                if self.payload.as_map().is_none() {
                    return Err(ValidationError::PayloadNotMap {
                        kind: self.kind.as_str(),
                        found: self.payload.kind_name(),
                    });
                }
            }
            WriteKind::Delete => {
                if !self.payload.is_null() {
                    return Err(ValidationError::PayloadOnDelete(self.payload.kind_name()));
                }
            }
        }
        Ok(())
    }

    /// Top-level field names of the payload, used for update masks.
    pub fn field_names(&self) -> Vec<String> {
        self.payload
            .as_map()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
