//! Firestore REST API types for `documents:batchWrite`.

use std::collections::HashMap;

use harvest_models::{DocValue, ErrorClass, WriteKind, WriteOperation};
use serde::{Deserialize, Serialize};

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

impl From<&DocValue> for Value {
    fn from(value: &DocValue) -> Self {
        match value {
            DocValue::Null => Value::NullValue(()),
            DocValue::Bool(b) => Value::BooleanValue(*b),
            DocValue::Integer(i) => Value::IntegerValue(i.to_string()),
            DocValue::Double(f) => Value::DoubleValue(*f),
            DocValue::String(s) => Value::StringValue(s.clone()),
            DocValue::Array(items) => Value::ArrayValue(ArrayValue {
                values: Some(items.iter().map(Value::from).collect()),
            }),
            DocValue::Map(fields) => Value::MapValue(MapValue {
                fields: Some(to_fields(fields.iter())),
            }),
        }
    }
}

fn to_fields<'a>(fields: impl Iterator<Item = (&'a String, &'a DocValue)>) -> HashMap<String, Value> {
    fields.map(|(k, v)| (k.clone(), Value::from(v))).collect()
}

/// Firestore document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
}

// ============================================================================
// Batch Write Types
// ============================================================================

/// A single write operation in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    /// Update or insert a document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,

    /// Delete a document by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    /// Field mask for partial updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,

    /// Precondition for the write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

impl Write {
    /// Translate a queued operation; `name` is the full resource name.
    pub fn from_operation(op: &WriteOperation, name: String) -> Self {
        let fields = op.payload.as_map().map(|m| to_fields(m.iter()));
        let exists = op.options.exists;
        let mask = || DocumentMask {
            field_paths: op.field_names().iter().map(|f| quote_field_path(f)).collect(),
        };

        match op.kind {
            WriteKind::Set => Write {
                update: Some(Document {
                    name: Some(name),
                    fields,
                }),
                delete: None,
                update_mask: op.options.merge.then(mask),
                current_document: exists.map(Precondition::exists),
            },
            WriteKind::Update => Write {
                update: Some(Document {
                    name: Some(name),
                    fields,
                }),
                delete: None,
                update_mask: Some(mask()),
                current_document: Some(Precondition::exists(exists.unwrap_or(true))),
            },
            WriteKind::Delete => Write {
                update: None,
                delete: Some(name),
                update_mask: None,
                current_document: exists.map(Precondition::exists),
            },
        }
    }
}

/// Quote a field name unless it is a simple identifier.
pub fn quote_field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Document field mask for partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

/// Precondition for a write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    /// Document must (or must not) exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl Precondition {
    pub fn exists(exists: bool) -> Self {
        Self {
            exists: Some(exists),
        }
    }
}

/// Batch write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    pub writes: Vec<Write>,
}

/// Result of a single write in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// Update time of the written document.
    pub update_time: Option<String>,
}

/// Status of a single write in a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// gRPC status code (0 = OK).
    pub code: Option<i32>,
    /// Error message if failed.
    pub message: Option<String>,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.code.unwrap_or(0) == 0
    }

    /// Failure class of a non-OK status.
    pub fn class(&self) -> ErrorClass {
        match self.code.unwrap_or(0) {
            // DEADLINE_EXCEEDED
            4 => ErrorClass::Timeout,
            // RESOURCE_EXHAUSTED
            8 => ErrorClass::RateLimited,
            // ABORTED, INTERNAL, UNAVAILABLE
            10 | 13 | 14 => ErrorClass::ServerError,
            _ => ErrorClass::ClientError,
        }
    }
}

/// Batch write response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResponse {
    /// Results for each write, in order.
    pub write_results: Option<Vec<WriteResult>>,
    /// Status for each write, in order.
    pub status: Option<Vec<Status>>,
}
