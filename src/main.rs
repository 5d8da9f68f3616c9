//! markview - live preview server for markdown trees.

mod auth;
mod cache;
mod cli;
mod compiler;
mod config;
mod core;
mod embed;
mod logger;
mod reload;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Serve { .. } => {
            let config = AppConfig::load(&cli)?;
            let shutdown = core::Shutdown::new();
            shutdown.install_ctrlc()?;
            cli::serve::serve(&config, &shutdown)
        }
        Commands::Render { file, body } => cli::render::render_file(file, *body),
    }
}
