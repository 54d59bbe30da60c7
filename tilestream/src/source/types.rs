//! Tile source abstraction.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::archive::TileArchive;
use crate::coord::{TileKey, ZoomBounds};
use crate::provider::FetchError;

/// Errors raised while configuring a source from remote metadata.
///
/// A source that hits one of these stays unconfigured; the load is retried
/// the next time a tile is requested from it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The metadata document could not be downloaded.
    #[error("Metadata request failed: {0}")]
    Http(#[from] FetchError),

    /// The document is not valid JSON or misses required fields.
    #[error("Invalid metadata document: {0}")]
    Parse(String),

    /// The service answered but refused the request (bad key, no imagery).
    #[error("Metadata rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

/// One place a tile can be fetched from.
#[derive(Clone)]
pub enum FetchLocation {
    /// Fully expanded URL.
    Remote(String),
    /// Local archive, read by key.
    Archive(Arc<dyn TileArchive>),
}

impl fmt::Debug for FetchLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchLocation::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
            FetchLocation::Archive(archive) => {
                f.debug_tuple("Archive").field(&archive.name()).finish()
            }
        }
    }
}

/// Default view center of a layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Center {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

/// Geographic extent of a layer in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Descriptive and addressing information about a layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceMetadata {
    pub name: String,
    pub description: String,
    pub attribution: String,
    pub legend: String,
    pub center: Option<Center>,
    pub bounding_box: Option<BoundingBox>,
    pub zoom: ZoomBounds,
    /// URL templates with `{z}`, `{x}`, `{y}`, `{2x}` and `{quadkey}` placeholders.
    pub tile_templates: Vec<String>,
}

impl SourceMetadata {
    /// Metadata carrying only a name and zoom range.
    pub fn named(name: impl Into<String>, zoom: ZoomBounds) -> Self {
        Self {
            name: name.into(),
            zoom,
            ..Default::default()
        }
    }
}

/// Where a logical layer's tiles live and what the layer is.
///
/// Sources never fetch tiles themselves; they only say where to look.
/// Implementations that need remote metadata expose it through the same
/// interface ([`metadata`](Self::metadata), [`bounds`](Self::bounds)) once it
/// arrives, so callers never need to know the concrete type.
pub trait TileSource: Send + Sync {
    /// Prefix identifying this layer in cache keys.
    fn cache_key_prefix(&self) -> String;

    /// Ordered places to fetch `key` from. More than one location means the
    /// results are composited, later over earlier.
    ///
    /// An unconfigured source returns an empty list.
    fn locations_for(&self, key: &TileKey, high_density: bool) -> Vec<FetchLocation>;

    /// Current metadata snapshot.
    fn metadata(&self) -> Arc<SourceMetadata>;

    /// Zoom levels the layer serves.
    fn bounds(&self) -> ZoomBounds {
        self.metadata().zoom
    }

    /// Whether remote metadata (if any) has been loaded.
    fn is_configured(&self) -> bool {
        true
    }

    /// Start any background initialization. Called once when the source is
    /// registered with a service.
    fn initialize(&self) {}
}
