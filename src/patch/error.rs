//! Patch errors and the stage each one terminates.

use crate::syntax::ParseError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// `received → resolving-module → resolving-node → applying-ops → generating
/// → formatting → writing → done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchStage {
    ResolvingModule,
    ResolvingNode,
    ApplyingOps,
    Generating,
    Formatting,
    Writing,
}

impl fmt::Display for PatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolvingModule => "resolving-module",
            Self::ResolvingNode => "resolving-node",
            Self::ApplyingOps => "applying-ops",
            Self::Generating => "generating",
            Self::Formatting => "formatting",
            Self::Writing => "writing",
        })
    }
}

/// A failed patch. The file and the registry are left as they were.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("module `{module_id}` is not registered")]
    ModuleNotFound { module_id: String },

    #[error("no element `{node_id}` in `{module_id}`")]
    NodeNotFound { module_id: String, node_id: String },

    #[error("live node `{id}` does not belong to any registered module")]
    UnknownElement { id: String },

    #[error("attribute `{name}` not found on <{tag_name}>")]
    AttributeNotFound { name: String, tag_name: String },

    #[error("`{path}` is not a literal and cannot be patched")]
    TargetNotLiteral { path: String },

    #[error("path `{path}` does not resolve: {reason}")]
    PathNotFound { path: String, reason: String },

    #[error("module `{module_id}` changed since the request was issued")]
    StaleModule { module_id: String },

    #[error("patched source no longer parses")]
    InvalidOutput(#[source] ParseError),

    #[error("failed to write `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub fn stage(&self) -> PatchStage {
        match self {
            Self::ModuleNotFound { .. } | Self::StaleModule { .. } => PatchStage::ResolvingModule,
            Self::NodeNotFound { .. } | Self::UnknownElement { .. } => PatchStage::ResolvingNode,
            Self::AttributeNotFound { .. }
            | Self::TargetNotLiteral { .. }
            | Self::PathNotFound { .. } => PatchStage::ApplyingOps,
            Self::InvalidOutput(_) => PatchStage::Generating,
            Self::Io { .. } => PatchStage::Writing,
        }
    }

    /// Machine-readable kind sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModuleNotFound { .. } => "module_not_found",
            Self::NodeNotFound { .. } => "node_not_found",
            Self::UnknownElement { .. } => "unknown_element",
            Self::AttributeNotFound { .. } => "attribute_not_found",
            Self::TargetNotLiteral { .. } => "target_not_literal",
            Self::PathNotFound { .. } => "path_not_found",
            Self::StaleModule { .. } => "stale_module",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Io { .. } => "io",
        }
    }
}
