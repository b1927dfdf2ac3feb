//! DuoFeed CLI — Command-line interface for multi-feed compositing.
//!
//! Usage:
//!   duofeed check                  Check backends, pipeline elements and devices
//!   duofeed describe [SOURCES]...  Print the graph description
//!   duofeed preview [SOURCES]...   Run a live session controlled from stdin

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use duofeed_common::config::AppConfig;

mod commands;
mod setup;

#[derive(Parser)]
#[command(
    name = "duofeed",
    about = "Composite several live capture feeds into one window",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check rendering backends, pipeline elements and capture devices
    Check,

    /// Print the graph description for the configured sources
    Describe {
        #[command(flatten)]
        sources: setup::SourceArgs,

        /// Print the description as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a live preview session; control commands are read from stdin
    Preview {
        #[command(flatten)]
        sources: setup::SourceArgs,

        /// Native window handle to render into (X11 window id, HWND).
        /// Without it the sink opens its own window.
        #[arg(long)]
        window_handle: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    duofeed_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Check => commands::check::run(&config),
        Commands::Describe { sources, json } => {
            sources.apply(&mut config);
            commands::describe::run(&config, json)
        }
        Commands::Preview {
            sources,
            window_handle,
        } => {
            sources.apply(&mut config);
            commands::preview::run(&config, window_handle).await
        }
    }
}
