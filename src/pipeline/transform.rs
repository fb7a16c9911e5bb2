//! The module transform entry point.

use super::analysis::analyze;
use super::instrument::{InstrumentOptions, instrument};
use crate::config::PimentoConfig;
use crate::freshness::ContentHash;
use crate::matcher::{IncludeMatcher, PatternError};
use crate::registry::{ModuleEntry, ModuleRegistry, module_id};
use crate::syntax::ParseError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
}

#[derive(Debug)]
pub enum TransformOutcome {
    /// Outside the include patterns; the text is left alone.
    NotApplicable,
    Transformed(TransformOutput),
}

#[derive(Debug)]
pub struct TransformOutput {
    pub code: String,
    pub entry: Arc<ModuleEntry>,
    /// The registry already held this exact content.
    pub reused: bool,
}

impl TransformOutcome {
    pub fn output(&self) -> Option<&TransformOutput> {
        match self {
            Self::NotApplicable => None,
            Self::Transformed(out) => Some(out),
        }
    }
}

/// Applies the pipeline to modules and records them in the registry.
#[derive(Debug, Clone)]
pub struct ModuleTransformer {
    matcher: IncludeMatcher,
    options: InstrumentOptions,
    registry: Arc<ModuleRegistry>,
}

impl ModuleTransformer {
    pub fn new(
        matcher: IncludeMatcher,
        options: InstrumentOptions,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            matcher,
            options,
            registry,
        }
    }

    pub fn from_config(
        config: &PimentoConfig,
        registry: Arc<ModuleRegistry>,
    ) -> Result<Self, PatternError> {
        let matcher = IncludeMatcher::from_config(&config.root, &config.transform)?;
        Ok(Self::new(
            matcher,
            InstrumentOptions::from(&config.transform),
            registry,
        ))
    }

    pub fn is_applicable(&self, path: &Path) -> bool {
        self.matcher.is_match(path)
    }

    pub fn matcher(&self) -> &IncludeMatcher {
        &self.matcher
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// `transform(filePath, sourceText) -> instrumentedText`.
    pub fn transform(&self, path: &Path, text: &str) -> Result<TransformOutcome, TransformError> {
        if !self.is_applicable(path) {
            return Ok(TransformOutcome::NotApplicable);
        }
        self.transform_unchecked(path, text).map(TransformOutcome::Transformed)
    }

    /// Read `path` from disk and transform it.
    pub fn transform_file(&self, path: &Path) -> Result<TransformOutcome, TransformError> {
        if !self.is_applicable(path) {
            return Ok(TransformOutcome::NotApplicable);
        }
        let text =
            std::fs::read_to_string(path).map_err(|e| TransformError::Io(path.to_path_buf(), e))?;
        self.transform_unchecked(path, &text).map(TransformOutcome::Transformed)
    }

    /// Transform without consulting the include patterns.
    pub fn transform_unchecked(
        &self,
        path: &Path,
        text: &str,
    ) -> Result<TransformOutput, TransformError> {
        let id = module_id(path);
        let fingerprint = ContentHash::of(text);

        // Same content, same ids: reuse the registered generation.
        let (entry, reused) = match self.registry.get(&id) {
            Some(entry) if entry.fingerprint == fingerprint => (entry, true),
            _ => {
                let analysis = analyze(path, text, &self.options.attribute)?;
                let entry = self
                    .registry
                    .insert(ModuleEntry::new(path, text.to_string(), analysis));
                (entry, false)
            }
        };

        let code = instrument(&entry, &self.options);
        crate::debug!(
            "transform";
            "{} ({} elements{})",
            id,
            entry.tree.len(),
            if reused { ", reused" } else { "" }
        );

        Ok(TransformOutput {
            code,
            entry,
            reused,
        })
    }
}
