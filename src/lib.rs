//! dirmatch - directory tree comparison
//!
//! Indexes a reference tree, then classifies every file of a target tree as
//! Missing, Matched, Renamed or Modified relative to it, using name
//! equality, byte comparison and pluggable content fingerprints. Files that
//! already have a counterpart can be deleted.

pub mod actions;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod matching;
pub mod output;
pub mod plugins;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{IsTerminal, Write};

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::commands::AppContext;
use crate::config::Config;
use crate::error::ExitCode;

/// Run the parsed command line, writing results to stdout.
///
/// # Errors
///
/// Any fatal error of the selected subcommand.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let color = !cli.no_color && std::io::stdout().is_terminal();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    run_app_with_writer(cli, color, &mut handle)
}

/// Run the parsed command line, writing results to `writer`.
///
/// # Errors
///
/// Any fatal error of the selected subcommand.
pub fn run_app_with_writer(cli: Cli, color: bool, writer: &mut dyn Write) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref())?;
    log::debug!("Effective configuration: {:?}", config);

    let token = signal::install_handler()?;
    let ctx = AppContext::new(config, token, cli.quiet, color && !cli.no_color);

    match &cli.command {
        Commands::BuildIndex(args) => commands::build_index(&ctx, args),
        Commands::RefreshIndex(args) => commands::refresh_index(&ctx, args),
        Commands::Compare(args) => commands::compare(&ctx, args, writer),
        Commands::IndexInfo(args) => commands::index_info(&ctx, args, writer),
        Commands::Plugins => commands::list_plugins(&ctx, writer),
    }
}
