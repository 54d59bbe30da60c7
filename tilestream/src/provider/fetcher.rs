//! Fetch, decode, composite, and cache one tile.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use super::http::HttpClient;
use super::types::{FetchError, TileProvider};
use crate::cache::TileCache;
use crate::coord::{TileKey, ZoomBounds};
use crate::source::{FetchLocation, TileSource};
use crate::tile::{self, TileImage};

/// A [`TileProvider`] that pulls tiles from a [`TileSource`].
///
/// Locations are fetched one after another on the calling worker thread and
/// decoded as they arrive. A single success is returned as is; several are
/// alpha-composited in location order. The result is written through to the
/// cache before it is returned.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tilestream::cache::{CacheConfig, TileCache};
/// use tilestream::coord::TileKey;
/// use tilestream::provider::{ReqwestClient, TileFetcher, TileProvider};
/// use tilestream::source::UrlTemplateSource;
///
/// let cache = Arc::new(TileCache::new(CacheConfig::default()));
/// let http = Arc::new(ReqwestClient::new().unwrap());
/// let source = Arc::new(UrlTemplateSource::new(
///     "osm",
///     "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
///     true,
/// ));
/// let fetcher = TileFetcher::new("network", source, http, cache);
/// let tile = fetcher.fetch(&TileKey::new("osm", 3, 2, 1));
/// ```
pub struct TileFetcher {
    name: String,
    source: Arc<dyn TileSource>,
    http: Arc<dyn HttpClient>,
    cache: Arc<TileCache>,
}

impl TileFetcher {
    /// # Arguments
    ///
    /// * `name` - Provider name for logs
    /// * `source` - Where tiles live
    /// * `http` - Client for remote locations
    /// * `cache` - Cache that receives every fetched tile
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn TileSource>,
        http: Arc<dyn HttpClient>,
        cache: Arc<TileCache>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            http,
            cache,
        }
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    fn fetch_location(&self, key: &TileKey, location: &FetchLocation) -> Result<TileImage, FetchError> {
        let bytes = match location {
            FetchLocation::Remote(url) => {
                trace!(provider = %self.name, url = %url, "GET");
                self.http.get(url)?
            }
            FetchLocation::Archive(archive) => archive.read(key)?.ok_or_else(|| {
                FetchError::Archive(format!("{} not found in {}", key, archive.name()))
            })?,
        };
        tile::decode(&bytes)
    }
}

impl TileProvider for TileFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, key: &TileKey) -> Result<TileImage, FetchError> {
        if !self.supports(key) {
            return Err(FetchError::UnsupportedZoom {
                provider: self.name.clone(),
                zoom: key.zoom(),
            });
        }

        let start = Instant::now();
        let locations = self
            .source
            .locations_for(key, key.variant().is_high_density());

        let mut layers = Vec::with_capacity(locations.len());
        let mut last_error = None;
        for location in &locations {
            match self.fetch_location(key, location) {
                Ok(layer) => layers.push(layer),
                Err(e) => {
                    debug!(provider = %self.name, tile = %key, location = ?location, error = %e, "Location failed");
                    last_error = Some(e);
                }
            }
        }

        let Some(image) = tile::composite(&layers) else {
            return Err(last_error.unwrap_or_else(|| FetchError::NoLocations(key.to_string())));
        };

        self.cache.put(key, &image);
        debug!(
            provider = %self.name,
            tile = %key,
            layers = layers.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tile fetched"
        );
        Ok(image)
    }

    fn bounds(&self) -> ZoomBounds {
        self.source.bounds()
    }
}
