//! Project configuration management for `pimento.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build      # [build]
//! │   ├── format     # [format]
//! │   ├── registry   # [registry]
//! │   ├── serve      # [serve]
//! │   └── transform  # [transform]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # PimentoConfig (this file)
//! ```
//!
//! A missing config file is not an error: every section has defaults and the
//! project root falls back to the current directory.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{BuildConfig, FormatConfig, RegistryConfig, ServeConfig, TransformConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::{
    cli::{Cli, Commands},
    log,
    utils::path::normalize_path,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing pimento.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PimentoConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub format: FormatConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

impl PimentoConfig {
    /// Load configuration from CLI arguments.
    ///
    /// Searches upward from cwd for the config file; the project root is the
    /// config file's parent directory, or cwd when there is no config file.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "no {} found, using defaults", cli.config.display());
                Self {
                    config_path: cwd.join(&cli.config),
                    root: cwd,
                    ..Self::default()
                }
            }
        };

        config.finalize(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Finalize configuration after loading: absolute paths, CLI overrides.
    fn finalize(&mut self, cli: &Cli) {
        self.root = normalize_path(&self.root);
        self.config_path = normalize_path(&self.config_path);
        self.build.output = normalize_path(&self.root.join(&self.build.output));
        self.apply_command_options(cli);
    }

    /// Get path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Instrument { clean } => self.build.clean = *clean,
            Commands::Serve {
                interface,
                port,
                watch,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            Commands::Patch { args } if args.no_format => self.format.enable = false,
            Commands::Patch { .. } | Commands::Transform { .. } => {}
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate configuration, collecting all errors and returning them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.transform.validate(&mut diag);
        self.format.validate(&mut diag);

        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> PimentoConfig {
    let (parsed, ignored) = PimentoConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

/// Default config rooted at `root`.
#[cfg(test)]
pub fn test_config_at(root: &Path) -> PimentoConfig {
    let mut config = PimentoConfig {
        root: root.to_path_buf(),
        config_path: root.join("pimento.toml"),
        ..PimentoConfig::default()
    };
    config.build.output = root.join(&config.build.output);
    config.format.enable = false;
    config
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_str_invalid_toml() {
        let result = PimentoConfig::from_str("[transform\ninclude = [\"src\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_default() {
        let config = PimentoConfig::default();
        assert_eq!(config.config_path, PathBuf::new());
        assert_eq!(config.serve.port, 5278);
        assert_eq!(config.registry.max_modules, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[transform]\ninclude = [\"src\"]\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = PimentoConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.transform.include, vec!["src"]);
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_no_unknown_fields() {
        let content = "[serve]\nport = 9000\n[registry]\nmax_modules = 10";
        let (_, ignored) = PimentoConfig::parse_with_ignored(content).unwrap();
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_root_relative() {
        let config = test_config_at(Path::new("/project"));
        assert_eq!(
            config.root_relative("/project/src/App.tsx"),
            Path::new("src/App.tsx")
        );
        assert_eq!(config.root_relative("/elsewhere/x.ts"), Path::new("/elsewhere/x.ts"));
    }

    #[test]
    fn test_serve_cli_overrides() {
        let cli = Cli::parse_from(["pimento", "serve", "-p", "9001", "--watch", "false"]);
        let mut config = test_config_at(Path::new("/project"));
        config.apply_command_options(&cli);
        assert_eq!(config.serve.port, 9001);
        assert!(!config.serve.watch);
        assert_eq!(config.serve.interface.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_patch_no_format_override() {
        let cli = Cli::parse_from(["pimento", "patch", "a.tsx", "node-1", "[]", "--no-format"]);
        let mut config = PimentoConfig::default();
        assert!(config.format.enable);
        config.apply_command_options(&cli);
        assert!(!config.format.enable);
    }

    #[test]
    fn test_validate_collects_all() {
        let config = test_parse_config(
            "[transform]\ninclude = []\nattribute = \"bad name\"\n[format]\nenable = true\ncommand = []",
        );
        let err = config.validate().unwrap_err();
        let diag = match err.downcast::<ConfigError>().unwrap() {
            ConfigError::Diagnostics(diag) => diag,
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!(diag.len(), 3);
    }
}
