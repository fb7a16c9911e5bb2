//! Include pattern matching.
//!
//! Decides which modules are eligible for instrumentation. Patterns come from
//! `transform.include` and are resolved against the project root:
//!
//! | Pattern          | Expands to                 |
//! |------------------|----------------------------|
//! | `src`            | `<root>/src/**/*`          |
//! | `src/components` | `<root>/src/components/**/*` |
//! | `src/*.tsx`      | `<root>/src/*.tsx`         |
//! | `lib/App.jsx`    | `<root>/lib/App.jsx`       |
//! | `src/**/x?`      | `<root>/src/**/x?`         |
//!
//! Matching is case-insensitive and dot-files match wildcards. `glob` has no
//! brace expansion or extglobs, so `{a,b}` only matches literally.

use crate::config::TransformConfig;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Error)]
#[error("invalid include pattern `{pattern}`: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: glob::PatternError,
}

/// Compiled include patterns plus the extension filter.
#[derive(Debug, Clone)]
pub struct IncludeMatcher {
    root: PathBuf,
    patterns: Vec<Pattern>,
    extensions: Vec<String>,
    /// Literal directory prefix of each pattern, for walking and watching.
    bases: Vec<PathBuf>,
}

impl IncludeMatcher {
    pub fn new(
        root: &Path,
        include: &[String],
        extensions: &[String],
    ) -> Result<Self, PatternError> {
        let mut patterns = Vec::with_capacity(include.len());
        let mut bases: Vec<PathBuf> = Vec::new();

        for raw in include.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let expanded = expand_pattern(root, raw);
            let pattern = Pattern::new(&expanded).map_err(|source| PatternError {
                pattern: raw.to_string(),
                source,
            })?;
            patterns.push(pattern);

            let base = literal_prefix(&expanded);
            if !bases.iter().any(|b| base.starts_with(b)) {
                bases.retain(|b| !b.starts_with(&base));
                bases.push(base);
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            patterns,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            bases,
        })
    }

    pub fn from_config(root: &Path, config: &TransformConfig) -> Result<Self, PatternError> {
        Self::new(root, &config.include, &config.extensions)
    }

    /// Whether `path` should be instrumented. Relative paths are taken from root.
    pub fn is_match(&self, path: &Path) -> bool {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        self.has_extension(&path)
            && self
                .patterns
                .iter()
                .any(|p| p.matches_path_with(&path, MATCH_OPTIONS))
    }

    fn has_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories (or single files) that can contain matches, none nested
    /// inside another.
    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.bases
    }
}

/// Leading components of an expanded pattern that contain no wildcard.
fn literal_prefix(expanded: &str) -> PathBuf {
    Path::new(expanded)
        .components()
        .take_while(|c| !c.as_os_str().to_string_lossy().contains(['*', '?', '[']))
        .collect()
}

/// Resolve a pattern against root, expanding directory shorthand.
fn expand_pattern(root: &Path, pattern: &str) -> String {
    let pattern = pattern.trim_end_matches('/');
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);

    let base = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        let root = root.to_string_lossy();
        let root = root.trim_end_matches('/');
        if pattern.is_empty() || pattern == "." {
            root.to_string()
        } else {
            format!("{root}/{pattern}")
        }
    };

    if is_directory_pattern(pattern) {
        format!("{base}/**/*")
    } else {
        base
    }
}

/// No extension in the last segment and no trailing wildcard.
fn is_directory_pattern(pattern: &str) -> bool {
    if pattern.ends_with('*') || pattern.ends_with('?') {
        return false;
    }
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    !last.char_indices().any(|(i, c)| c == '.' && i >= 1)
}
