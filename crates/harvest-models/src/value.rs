//! Bounded, serializable payload values.
//!
//! Payloads arrive as loosely-typed JSON from external APIs. They are
//! narrowed to `DocValue` at the enqueue boundary so the store layer only
//! ever sees values it can encode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A document payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DocValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<DocValue>),
    Map(BTreeMap<String, DocValue>),
}

impl DocValue {
    /// Build a map value from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DocValue)>,
    {
        DocValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DocValue::Null => "null",
            DocValue::Bool(_) => "boolean",
            DocValue::Integer(_) => "integer",
            DocValue::Double(_) => "double",
            DocValue::String(_) => "string",
            DocValue::Array(_) => "array",
            DocValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DocValue>> {
        match self {
            DocValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a top-level field of a map value.
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl TryFrom<serde_json::Value> for DocValue {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::Null => DocValue::Null,
            serde_json::Value::Bool(b) => DocValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DocValue::Integer(i)
                } else if n.is_u64() {
                    // Does not fit the store's signed 64-bit integers.
                    return Err(ValidationError::UnsupportedValue(format!(
                        "integer {} exceeds i64 range",
                        n
                    )));
                } else {
                    match n.as_f64() {
                        Some(f) => DocValue::Double(f),
                        None => {
                            return Err(ValidationError::UnsupportedValue(format!(
                                "number {} is not representable",
                                n
                            )))
                        }
                    }
                }
            }
            serde_json::Value::String(s) => DocValue::String(s),
            serde_json::Value::Array(items) => DocValue::Array(
                items
                    .into_iter()
                    .map(DocValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(fields) => DocValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| DocValue::try_from(v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<DocValue> for serde_json::Value {
    fn from(value: DocValue) -> Self {
        match value {
            DocValue::Null => serde_json::Value::Null,
            DocValue::Bool(b) => serde_json::Value::Bool(b),
            DocValue::Integer(i) => serde_json::Value::from(i),
            DocValue::Double(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DocValue::String(s) => serde_json::Value::String(s),
            DocValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            DocValue::Map(fields) => serde_json::Value::Object(
                fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<bool> for DocValue {
    fn from(value: bool) -> Self {
        DocValue::Bool(value)
    }
}

impl From<i64> for DocValue {
    fn from(value: i64) -> Self {
        DocValue::Integer(value)
    }
}

impl From<i32> for DocValue {
    fn from(value: i32) -> Self {
        DocValue::Integer(value as i64)
    }
}

impl From<u32> for DocValue {
    fn from(value: u32) -> Self {
        DocValue::Integer(value as i64)
    }
}

impl From<f64> for DocValue {
    fn from(value: f64) -> Self {
        DocValue::Double(value)
    }
}

impl From<String> for DocValue {
    fn from(value: String) -> Self {
        DocValue::String(value)
    }
}

impl From<&str> for DocValue {
    fn from(value: &str) -> Self {
        DocValue::String(value.to_string())
    }
}

impl<T: Into<DocValue>> From<Vec<T>> for DocValue {
    fn from(values: Vec<T>) -> Self {
        DocValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<DocValue>> From<Option<T>> for DocValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DocValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nested() {
        let value = DocValue::try_from(json!({
            "id": 204554,
            "nome": "Fulana",
            "valor": 12.5,
            "ativo": true,
            "tags": ["a", null],
        }))
        .unwrap();

        assert_eq!(value.get("id"), Some(&DocValue::Integer(204554)));
        assert_eq!(value.get("valor"), Some(&DocValue::Double(12.5)));
        assert_eq!(
            value.get("tags"),
            Some(&DocValue::Array(vec!["a".into(), DocValue::Null]))
        );
    }

    #[test]
    fn test_from_json_rejects_u64_overflow() {
        let err = DocValue::try_from(json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedValue(_)));
    }

    #[test]
    fn test_untagged_serialization() {
        let value = DocValue::map([("n", DocValue::Integer(3)), ("s", "x".into())]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"n":3,"s":"x"}"#);

        let back: DocValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_nan_becomes_json_null() {
        let json: serde_json::Value = DocValue::Double(f64::NAN).into();
        assert!(json.is_null());
    }
}
