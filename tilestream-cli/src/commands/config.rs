//! Configuration CLI commands.

use std::path::PathBuf;

use clap::Subcommand;
use tilestream::config::{config_file_path, TileStreamConfig};

use super::common::load_config;
use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommands, config_path: Option<&PathBuf>) -> Result<(), CliError> {
    let path = config_path.cloned().unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Show => print!("{}", load_config(Some(&path))?.to_ini_string()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            TileStreamConfig::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
