//! Provider trait and fetch errors.

use thiserror::Error;

use crate::coord::{TileKey, ZoomBounds};
use crate::tile::TileImage;

/// Errors produced while fetching one tile from one provider.
///
/// Transport and decode failures share this type so the chain can treat them
/// alike: either way the provider failed and the next one is tried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection or protocol failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The request exceeded the client timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The payload is not a decodable image.
    #[error("Failed to decode tile: {0}")]
    Decode(String),

    /// Local archive read failure.
    #[error("Archive error: {0}")]
    Archive(String),

    /// The source produced nothing to fetch for this tile.
    #[error("No locations for tile {0}")]
    NoLocations(String),

    /// The provider does not serve this zoom level.
    #[error("Zoom level {zoom} not supported by {provider}")]
    UnsupportedZoom { provider: String, zoom: u8 },

    /// The provider panicked while fetching.
    #[error("Provider {provider} panicked: {message}")]
    Panicked { provider: String, message: String },
}

impl FetchError {
    /// True for failures that may go away on retry (network trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A backing store that can produce a decoded tile for a key.
///
/// Implementations run on provider worker threads and may block.
pub trait TileProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch, decode, and (for cache-aware providers) persist one tile.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when no image could be produced; partial
    /// results are never returned.
    fn fetch(&self, key: &TileKey) -> Result<TileImage, FetchError>;

    /// Zoom levels this provider serves.
    fn bounds(&self) -> ZoomBounds {
        ZoomBounds::default()
    }

    /// Whether the chain should hand this key to the provider at all.
    fn supports(&self, key: &TileKey) -> bool {
        self.bounds().contains(key.zoom())
    }
}
