//! `[format]` section configuration.
//!
//! Patched modules are piped through this command before they are written.
//! `$PIMENTO_FILE` in any argument is replaced with the module path.
//!
//! # Example
//!
//! ```toml
//! [format]
//! enable = true
//! command = ["npx", "prettier", "--stdin-filepath", "$PIMENTO_FILE"]
//! ```

use crate::config::{ConfigDiagnostics, FieldPath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Run the formatter after patching.
    pub enable: bool,

    /// Formatter command; reads source on stdin, writes formatted source to stdout.
    pub command: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            enable: true,
            command: vec![
                "prettier".into(),
                "--stdin-filepath".into(),
                "$PIMENTO_FILE".into(),
            ],
        }
    }
}

impl FormatConfig {
    const COMMAND: FieldPath = FieldPath::new("format.command");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.enable && self.command.first().is_none_or(|c| c.trim().is_empty()) {
            diag.error_with_hint(
                Self::COMMAND,
                "`format.enable` is true but the command is empty",
                "set `format.enable = false` to write patches unformatted",
            );
        }
    }

    /// The command to run, if formatting is enabled.
    pub fn command(&self) -> Option<&[String]> {
        (self.enable && !self.command.is_empty()).then_some(self.command.as_slice())
    }
}
