//! Endpoint templates.
//!
//! A template such as `/deputados/{id}/despesas` names its placeholders in
//! braces. Parameters that fill a placeholder are URL-encoded into the path;
//! the rest become query parameters and override the endpoint defaults.

use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};

/// Named call parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A path and query ready to be appended to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

/// One external endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Name used in logs and metrics.
    pub name: String,
    pub path_template: String,
    pub default_query: Vec<(String, String)>,
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

impl Endpoint {
    pub fn new(name: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_template: path_template.into(),
            default_query: Vec::new(),
        }
    }

    /// Add a default query parameter.
    pub fn with_default(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.default_query.push((key.into(), value.to_string()));
        self
    }

    /// Names of the placeholders in the template, in order.
    pub fn placeholders(&self) -> ApiResult<Vec<&str>> {
        Ok(self
            .segments()?
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect())
    }

    fn segments(&self) -> ApiResult<Vec<Segment<'_>>> {
        let template = self.path_template.as_str();
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find(|c: char| c == '{' || c == '}') {
            if rest.as_bytes()[open] == b'}' {
                return Err(ApiError::invalid_request(format!(
                    "unbalanced '}}' in template '{}'",
                    template
                )));
            }
            let close = rest[open..].find('}').map(|i| open + i).ok_or_else(|| {
                ApiError::invalid_request(format!("unclosed '{{' in template '{}'", template))
            })?;

            let name = &rest[open + 1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ApiError::invalid_request(format!(
                    "invalid placeholder '{{{}}}' in template '{}'",
                    name, template
                )));
            }

            if open > 0 {
                segments.push(Segment::Literal(&rest[..open]));
            }
            segments.push(Segment::Placeholder(name));
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }
        Ok(segments)
    }

    /// Substitute placeholders and merge query parameters.
    pub fn render(&self, params: &Params) -> ApiResult<RenderedRequest> {
        let mut path = String::with_capacity(self.path_template.len());
        let mut consumed: Vec<&str> = Vec::new();

        for segment in self.segments()? {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(name) => {
                    let value = params.get(name).ok_or_else(|| {
                        ApiError::invalid_request(format!(
                            "endpoint '{}' requires parameter '{}'",
                            self.name, name
                        ))
                    })?;
                    if value.is_empty() {
                        return Err(ApiError::invalid_request(format!(
                            "parameter '{}' of endpoint '{}' is empty",
                            name, self.name
                        )));
                    }
                    path.push_str(&urlencoding::encode(value));
                    consumed.push(name);
                }
            }
        }
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        let mut query = self.default_query.clone();
        for (key, value) in params.iter() {
            if consumed.contains(&key.as_str()) {
                continue;
            }
            match query.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.clone(),
                None => query.push((key.clone(), value.clone())),
            }
        }

        Ok(RenderedRequest { path, query })
    }
}
