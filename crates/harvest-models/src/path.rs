//! Document paths.
//!
//! A path alternates collection and document segments
//! (`collection/doc/subcollection/doc`), so a document path always has an
//! even, non-zero number of segments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// A validated document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Parse a slash-separated path. Leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let trimmed = path.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        Self::from_segments(segments)
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        if let Some(position) = segments.iter().position(|s| s.trim().is_empty()) {
            return Err(PathError::EmptySegment {
                path: segments.join("/"),
                position,
            });
        }

        if segments.len() % 2 != 0 {
            return Err(PathError::OddSegments {
                path: segments.join("/"),
                segments: segments.len(),
            });
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (always even).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final document id.
    pub fn document_id(&self) -> &str {
        // from_segments guarantees at least two segments
        &self.segments[self.segments.len() - 1]
    }

    /// The collection path containing this document, e.g. `a/b/c` for `a/b/c/d`.
    pub fn collection_path(&self) -> String {
        self.segments[..self.segments.len() - 1].join("/")
    }

    /// Append a subcollection and document id.
    pub fn child(&self, collection: &str, document_id: &str) -> Result<Self, PathError> {
        let mut segments = self.segments.clone();
        segments.push(collection.to_string());
        segments.push(document_id.to_string());
        Self::from_segments(segments)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for DocumentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.to_string()
    }
}
