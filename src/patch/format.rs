//! External formatter.
//!
//! Runs the configured command with the module text on stdin and takes its
//! stdout as the formatted text. Any failure leaves the text unformatted.

use crate::config::PimentoConfig;
use crate::log;
use crate::utils::exec::{Cmd, resolve_args};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Formatter {
    command: Vec<String>,
    cwd: PathBuf,
}

impl Formatter {
    pub fn new(command: Vec<String>, cwd: PathBuf) -> Self {
        Self { command, cwd }
    }

    /// `None` when formatting is disabled.
    pub fn from_config(config: &PimentoConfig) -> Option<Self> {
        config
            .format
            .command()
            .map(|command| Self::new(command.to_vec(), config.root.clone()))
    }

    /// Formatted text, or `None` if the command failed or printed nothing.
    pub fn format(&self, path: &Path, text: &str) -> Option<String> {
        let mut vars = FxHashMap::default();
        vars.insert("PIMENTO_FILE", path.display().to_string());
        let args = resolve_args(&self.command, &vars);

        let output = match Cmd::from_slice(&args).cwd(&self.cwd).stdin(text).run() {
            Ok(output) => output,
            Err(e) => {
                log!("format"; "skipped for {}: {e:#}", path.display());
                return None;
            }
        };

        match String::from_utf8(output.stdout) {
            Ok(formatted) if !formatted.trim().is_empty() => Some(formatted),
            Ok(_) => None,
            Err(_) => {
                log!("format"; "skipped for {}: output is not UTF-8", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config_at;

    #[test]
    fn test_disabled_formatter() {
        let config = test_config_at(Path::new("/project"));
        assert!(Formatter::from_config(&config).is_none());
    }

    #[test]
    fn test_enabled_formatter() {
        let mut config = test_config_at(Path::new("/project"));
        config.format.enable = true;
        let formatter = Formatter::from_config(&config).unwrap();
        assert_eq!(formatter.command[0], "prettier");
    }

    #[test]
    fn test_missing_program_is_none() {
        let formatter = Formatter::new(
            vec!["pimento-no-such-formatter".into()],
            std::env::temp_dir(),
        );
        assert_eq!(formatter.format(Path::new("a.tsx"), "x"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_passthrough() {
        let formatter = Formatter::new(vec!["cat".into()], std::env::temp_dir());
        assert_eq!(
            formatter.format(Path::new("a.tsx"), "<A />\n").as_deref(),
            Some("<A />\n")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_placeholder() {
        let formatter = Formatter::new(
            vec!["sh".into(), "-c".into(), "echo \"$0\"".into(), "$PIMENTO_FILE".into()],
            std::env::temp_dir(),
        );
        assert_eq!(
            formatter.format(Path::new("src/App.tsx"), "").as_deref(),
            Some("src/App.tsx\n")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_is_none() {
        let formatter = Formatter::new(
            vec!["sh".into(), "-c".into(), "exit 2".into()],
            std::env::temp_dir(),
        );
        assert_eq!(formatter.format(Path::new("a.tsx"), "x"), None);
    }
}
