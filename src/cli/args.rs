//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// markview: live preview server for markdown trees
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: markview.toml)
    #[arg(short = 'C', long, global = true, default_value = "markview.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve a markdown tree with live reload
    #[command(visible_alias = "s")]
    Serve {
        /// Source tree to render (overrides `[source] root`)
        #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
        root: Option<PathBuf>,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// HTTP port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Live reload websocket port
        #[arg(long = "ws-port")]
        ws_port: Option<u16>,

        /// Re-render pages when their source changes
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Render one markdown file to stdout
    #[command(visible_alias = "r")]
    Render {
        /// File to render
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Emit only the page body, without the HTML shell
        #[arg(short, long)]
        body: bool,
    },
}

impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}
