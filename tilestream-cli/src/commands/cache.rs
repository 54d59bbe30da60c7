//! Cache management CLI commands.

use std::path::PathBuf;

use clap::Subcommand;
use tilestream::cache::TileCache;
use tilestream::config::format_size;

use super::common::load_config;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove every tile from the disk cache
    Clear,
    /// Show disk cache location and usage
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config_path: Option<&PathBuf>) -> Result<(), CliError> {
    let mut config = load_config(config_path)?.cache_config();
    config.disk_enabled = true;
    let cache = TileCache::new(config);

    let directory = match (cache.is_disk_cache_enabled(), cache.directory()) {
        (true, Some(dir)) => dir.display().to_string(),
        (_, dir) => {
            let shown = dir.map_or_else(|| "<unresolved>".to_string(), |d| d.display().to_string());
            return Err(CliError::Config(format!(
                "disk cache at {} could not be opened",
                shown
            )));
        }
    };

    match action {
        CacheAction::Clear => {
            let files = cache.disk_entries();
            let bytes = cache.disk_size_bytes();
            println!("Clearing disk cache at: {}", directory);
            cache
                .purge_disk()
                .map_err(|e| CliError::Config(e.to_string()))?;
            println!("Deleted {} files, freed {}", files, format_size(bytes));
        }
        CacheAction::Stats => {
            println!("Disk cache: {}", directory);
            println!("  Files: {}", cache.disk_entries());
            println!("  Size:  {}", format_size(cache.disk_size_bytes()));
        }
    }
    Ok(())
}
