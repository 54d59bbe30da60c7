//! URL template sources.

use std::sync::Arc;

use super::types::{FetchLocation, SourceMetadata, TileSource};
use crate::coord::{TileKey, ZoomBounds};

/// Expand `{z}`, `{x}`, `{y}`, `{2x}` and `{quadkey}` for one tile.
///
/// `{2x}` becomes `@2x` for high-density requests and disappears otherwise.
///
/// # Example
///
/// ```
/// use tilestream::coord::TileKey;
/// use tilestream::source::expand_template;
///
/// let key = TileKey::new("osm", 3, 2, 1);
/// let url = expand_template("https://tile.example.com/{z}/{x}/{y}{2x}.png", &key, true);
/// assert_eq!(url, "https://tile.example.com/3/2/1@2x.png");
/// ```
pub fn expand_template(template: &str, key: &TileKey, high_density: bool) -> String {
    let mut url = template
        .replace("{z}", &key.zoom().to_string())
        .replace("{x}", &key.x().to_string())
        .replace("{y}", &key.y().to_string())
        .replace("{2x}", if high_density { "@2x" } else { "" });
    if url.contains("{quadkey}") {
        url = url.replace("{quadkey}", &key.quadkey());
    }
    url
}

/// Downgrade `https://` to `http://` when SSL is disabled.
pub fn apply_ssl(url: &str, ssl: bool) -> String {
    if ssl {
        url.to_string()
    } else {
        url.replace("https://", "http://")
    }
}

/// A layer served from fixed URL templates.
///
/// With several templates every tile is fetched from each and the results
/// are composited in order.
pub struct UrlTemplateSource {
    id: String,
    metadata: Arc<SourceMetadata>,
    high_density: bool,
}

impl UrlTemplateSource {
    /// Single-template source.
    ///
    /// # Arguments
    ///
    /// * `id` - Layer identifier, used as cache key prefix
    /// * `template` - URL template
    /// * `ssl` - When false, `https://` URLs are fetched over plain HTTP
    pub fn new(id: impl Into<String>, template: &str, ssl: bool) -> Self {
        Self::with_templates(id, &[template], ssl)
    }

    /// Multi-template source; layers composite in the given order.
    pub fn with_templates<S: AsRef<str>>(id: impl Into<String>, templates: &[S], ssl: bool) -> Self {
        let id = id.into();
        let metadata = SourceMetadata {
            name: id.clone(),
            tile_templates: templates
                .iter()
                .map(|t| apply_ssl(t.as_ref(), ssl))
                .collect(),
            ..Default::default()
        };
        Self {
            id,
            metadata: Arc::new(metadata),
            high_density: true,
        }
    }

    /// Restrict the served zoom range.
    pub fn with_zoom(mut self, bounds: ZoomBounds) -> Self {
        Arc::make_mut(&mut self.metadata).zoom = bounds;
        self
    }

    /// Set the attribution shown for this layer.
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.metadata).attribution = attribution.into();
        self
    }

    /// Never request `@2x` tiles, even for high-density keys.
    pub fn without_high_density(mut self) -> Self {
        self.high_density = false;
        self
    }
}

impl TileSource for UrlTemplateSource {
    fn cache_key_prefix(&self) -> String {
        self.id.clone()
    }

    fn locations_for(&self, key: &TileKey, high_density: bool) -> Vec<FetchLocation> {
        let hdpi = high_density && self.high_density;
        self.metadata
            .tile_templates
            .iter()
            .map(|t| FetchLocation::Remote(expand_template(t, key, hdpi)))
            .collect()
    }

    fn metadata(&self) -> Arc<SourceMetadata> {
        Arc::clone(&self.metadata)
    }
}
