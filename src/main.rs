//! pimento - edit rendered JSX elements and write the change back to source.

mod actor;
mod cli;
mod config;
mod core;
mod correlate;
mod freshness;
mod logger;
mod matcher;
mod patch;
mod pipeline;
mod registry;
mod syntax;
mod transport;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::PimentoConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    logger::set_verbose(cli.verbose);

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = PimentoConfig::load(cli)?;

    match &cli.command {
        Commands::Transform { file } => cli::transform::run(&config, file),
        Commands::Instrument { .. } => cli::instrument::run(&config),
        Commands::Patch { args } => cli::patch::run(&config, args),
        Commands::Serve { .. } => cli::serve::run(config),
    }
}
