//! `[transform]` section configuration.
//!
//! Controls which modules are instrumented and what the injected code looks like.
//!
//! # Example
//!
//! ```toml
//! [transform]
//! include = ["src", "lib/**/*.tsx"]   # Directory shorthand expands to `dir/**/*`
//! extensions = [".jsx", ".tsx"]       # Eligible file extensions
//! runtime = "pimento/runtime"         # Import specifier of the runtime library
//! attribute = "data-pimento-node"     # Identification attribute name
//! inline_metadata = false             # Embed tag name and descriptors inline
//! register = true                     # Emit the registration call
//! ```

use crate::config::{ConfigDiagnostics, FieldPath};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// JSX attribute names: identifier start, then word chars, `-` or `:`.
static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$:-]*$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Include patterns, relative to the project root.
    pub include: Vec<String>,

    /// File extensions eligible for instrumentation (with leading dot).
    pub extensions: Vec<String>,

    /// Import specifier of the runtime correlation library.
    pub runtime: String,

    /// Name of the identification attribute injected on every element.
    pub attribute: String,

    /// Also embed `jsxTagName` and `attributes` in the identification attribute.
    pub inline_metadata: bool,

    /// Append the `registerModule` call to instrumented modules.
    pub register: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            include: vec!["src".into()],
            extensions: [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".mts", ".cts"]
                .into_iter()
                .map(String::from)
                .collect(),
            runtime: "pimento/runtime".into(),
            attribute: "data-pimento-node".into(),
            inline_metadata: false,
            register: true,
        }
    }
}

impl TransformConfig {
    const INCLUDE: FieldPath = FieldPath::new("transform.include");
    const EXTENSIONS: FieldPath = FieldPath::new("transform.extensions");
    const RUNTIME: FieldPath = FieldPath::new("transform.runtime");
    const ATTRIBUTE: FieldPath = FieldPath::new("transform.attribute");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.include.iter().all(|p| p.trim().is_empty()) {
            diag.error_with_hint(
                Self::INCLUDE,
                "no include patterns, nothing would be instrumented",
                "add a source directory, e.g. `include = [\"src\"]`",
            );
        }

        if self.extensions.is_empty() {
            diag.error(Self::EXTENSIONS, "must list at least one extension");
        } else if let Some(ext) = self.extensions.iter().find(|e| !e.starts_with('.')) {
            diag.error_with_hint(
                Self::EXTENSIONS,
                format!("`{ext}` is missing its leading dot"),
                format!("write `.{ext}`"),
            );
        }

        if self.runtime.trim().is_empty() {
            diag.error(Self::RUNTIME, "runtime import specifier is empty");
        }

        if !ATTRIBUTE_NAME.is_match(&self.attribute) {
            diag.error(
                Self::ATTRIBUTE,
                format!("`{}` is not a valid JSX attribute name", self.attribute),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_transform_config_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.transform.include, vec!["src"]);
        assert!(config.transform.extensions.contains(&".tsx".to_string()));
        assert_eq!(config.transform.attribute, "data-pimento-node");
        assert!(config.transform.register);
        assert!(!config.transform.inline_metadata);
    }

    #[test]
    fn test_transform_config_override() {
        let config = test_parse_config(
            "[transform]\ninclude = [\"app\", \"lib/*.jsx\"]\ninline_metadata = true\nruntime = \"@acme/rt\"",
        );
        assert_eq!(config.transform.include, vec!["app", "lib/*.jsx"]);
        assert!(config.transform.inline_metadata);
        assert_eq!(config.transform.runtime, "@acme/rt");
    }

    #[test]
    fn test_transform_validate_ok() {
        let mut diag = ConfigDiagnostics::new();
        TransformConfig::default().validate(&mut diag);
        assert!(!diag.has_errors());
    }

    #[test]
    fn test_transform_validate_errors() {
        let config = TransformConfig {
            include: vec![],
            extensions: vec!["tsx".into()],
            runtime: " ".into(),
            attribute: "data node".into(),
            ..Default::default()
        };
        let mut diag = ConfigDiagnostics::new();
        config.validate(&mut diag);
        assert_eq!(diag.len(), 4);
    }

    #[test]
    fn test_attribute_name_pattern() {
        assert!(ATTRIBUTE_NAME.is_match("data-pimento-node"));
        assert!(ATTRIBUTE_NAME.is_match("xlink:href"));
        assert!(!ATTRIBUTE_NAME.is_match("1abc"));
        assert!(!ATTRIBUTE_NAME.is_match(""));
    }
}
