//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! output = ".pimento/out"     # Mirror directory for `pimento instrument`
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Output directory for instrumented modules (relative to root).
    pub output: PathBuf,

    /// Clean output directory before instrumenting (CLI only).
    #[serde(skip)]
    pub clean: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output: ".pimento/out".into(),
            clean: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;
    use std::path::Path;

    #[test]
    fn test_build_config() {
        let config = test_parse_config("[build]\noutput = \"dist/instrumented\"");
        assert_eq!(config.build.output, Path::new("dist/instrumented"));
        assert!(!config.build.clean);
    }

    #[test]
    fn test_build_config_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.build.output, Path::new(".pimento/out"));
    }
}
