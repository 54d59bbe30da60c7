//! tilestream CLI
//!
//! Thin front-end over the tilestream library: fetch tiles through the
//! cache and provider pipeline, warm the cache, and manage the disk cache.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilestream::logging::{default_log_dir, default_log_file, init_logging};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::prefetch::PrefetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilestream", version, about = "Map tile cache and loader")]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch one tile and save it as PNG
    Fetch(FetchArgs),
    /// Load a square of tiles into the cache
    Prefetch(PrefetchArgs),
    /// Disk cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_ref();
    match cli.command {
        Commands::Fetch(args) => {
            let _guard = init_logging(&default_log_dir(), default_log_file())
                .map_err(CliError::LoggingInit)?;
            commands::fetch::run(args, config)
        }
        Commands::Prefetch(args) => {
            let _guard = init_logging(&default_log_dir(), default_log_file())
                .map_err(CliError::LoggingInit)?;
            commands::prefetch::run(args, config)
        }
        Commands::Cache { action } => commands::cache::run(action, config),
        Commands::Config { command } => commands::config::run(command, config),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}
