//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use tilestream::app::AppError;
use tilestream::chain::TileError;
use tilestream::config::ConfigFileError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read or written
    ConfigFile(ConfigFileError),
    /// Failed to build or control the service
    Service(AppError),
    /// Tile request failed
    Tile(TileError),
    /// No result before the deadline
    Timeout(u64),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Tile(TileError::AllProvidersFailed { .. }) = self {
            eprintln!();
            eprintln!("Check that:");
            eprintln!("  1. The URL template or TileJSON URL is reachable");
            eprintln!("  2. The zoom level is served by the source");
            eprintln!("  3. API keys (Bing, Mapbox) are valid");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Tile(e) => write!(f, "Tile request failed: {}", e),
            CliError::Timeout(secs) => write!(f, "No tile delivered within {} seconds", secs),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::ConfigFile(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Tile(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Config(_) | CliError::Timeout(_) => None,
        }
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::Service(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}
