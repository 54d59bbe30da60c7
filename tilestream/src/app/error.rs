//! Application error types.

use std::fmt;

use crate::cache::CacheError;
use crate::config::ConfigFileError;
use crate::provider::FetchError;

/// Errors raised while building or controlling a [`TileService`](super::TileService).
#[derive(Debug)]
pub enum AppError {
    /// Configuration file could not be loaded.
    Config(ConfigFileError),

    /// The shared HTTP client could not be created.
    HttpClient(FetchError),

    /// A provider worker thread could not be spawned.
    WorkerSpawn(std::io::Error),

    /// A cache control operation failed.
    Cache(CacheError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::HttpClient(e) => write!(f, "Failed to create HTTP client: {}", e),
            AppError::WorkerSpawn(e) => write!(f, "Failed to start provider workers: {}", e),
            AppError::Cache(e) => write!(f, "Cache operation failed: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::HttpClient(e) => Some(e),
            AppError::WorkerSpawn(e) => Some(e),
            AppError::Cache(e) => Some(e),
        }
    }
}

impl From<ConfigFileError> for AppError {
    fn from(e: ConfigFileError) -> Self {
        AppError::Config(e)
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::Cache(e)
    }
}
