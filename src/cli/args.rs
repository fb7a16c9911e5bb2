//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// pimento: edit rendered JSX elements, write the change back to source
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: pimento.toml)
    #[arg(short = 'C', long, default_value = "pimento.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Instrument a single module and print the result
    #[command(visible_alias = "t")]
    Transform {
        /// Module to transform
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Instrument every included module into the output directory
    #[command(visible_alias = "i")]
    Instrument {
        /// Remove the output directory before writing
        #[arg(short, long)]
        clean: bool,
    },

    /// Apply a property patch to one element and write the file back
    #[command(visible_alias = "p")]
    Patch {
        #[command(flatten)]
        args: PatchArgs,
    },

    /// Instrument, watch, and accept patches over WebSocket
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable file watching for re-instrumentation
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

/// Patch command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct PatchArgs {
    /// Module containing the element
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Element identifier, e.g. `node-3`
    pub node_id: String,

    /// Patch as JSON. Use `-` or omit to read it from stdin.
    pub patch: Option<String>,

    /// Skip the configured formatter
    #[arg(long)]
    pub no_format: bool,
}
