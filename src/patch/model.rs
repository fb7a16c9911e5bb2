//! Patch model.
//!
//! Patches use the just-diff JSON format:
//!
//! ```json
//! [{ "op": "replace", "path": ["columns", 0, "type"], "value": "number" }]
//! ```
//!
//! The first path segment is the attribute name; the rest address into the
//! attribute's literal value.

use crate::syntax::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(k) => write!(f, ".{k}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// `columns[0].type`
pub fn display_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        match segment {
            PathSegment::Key(k) if i == 0 => out.push_str(k),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add {
        path: Vec<PathSegment>,
        value: serde_json::Value,
    },
    Replace {
        path: Vec<PathSegment>,
        value: serde_json::Value,
    },
    Remove {
        path: Vec<PathSegment>,
    },
}

impl PatchOperation {
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } | Self::Remove { path } => path,
        }
    }

    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Add { value, .. } | Self::Replace { value, .. } => Some(value),
            Self::Remove { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Replace { .. } => "replace",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Ordered operations, applied strictly in sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(pub Vec<PatchOperation>);

impl Patch {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// "Save property changes for this element."
#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub module_id: String,
    pub node_id: NodeId,
    pub patch: Patch,
    /// Fingerprint the client's node ids were issued against.
    pub fingerprint: Option<String>,
}
