//! TileJSON-described layers, including hosted Mapbox maps.
//!
//! The layer's tile URL, zoom range and descriptive fields come from a
//! [TileJSON](https://github.com/mapbox/tilejson-spec) document fetched in
//! the background. Until it arrives the source has no tile URL (plain
//! TileJSON) or a URL derived from the map id (Mapbox).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::metadata::RemoteMetadata;
use super::template::{apply_ssl, expand_template};
use super::types::{BoundingBox, Center, FetchLocation, SourceError, SourceMetadata, TileSource};
use crate::coord::{TileKey, ZoomBounds, MAX_ZOOM};
use crate::provider::HttpClient;

/// Base URL of the hosted Mapbox v4 tile API.
pub const MAPBOX_BASE_URL: &str = "https://a.tiles.mapbox.com/v4/";

#[derive(Debug, Deserialize)]
struct TileJsonDocument {
    #[serde(default)]
    tiles: Vec<String>,
    minzoom: Option<f64>,
    maxzoom: Option<f64>,
    name: Option<String>,
    description: Option<String>,
    attribution: Option<String>,
    legend: Option<String>,
    center: Option<Value>,
    bounds: Option<Value>,
}

/// Parse a TileJSON document on top of the current snapshot.
///
/// The first tile URL is adopted with `.png` rewritten to `{2x}.png` so
/// retina tiles can be requested. Fields missing from the document keep
/// their current values. `center` and `bounds` accept either a JSON array or
/// a comma-separated string, and are ignored when the length is wrong.
pub fn parse_tilejson(
    body: &[u8],
    current: &SourceMetadata,
    ssl: bool,
) -> Result<SourceMetadata, SourceError> {
    let doc: TileJsonDocument = serde_json::from_slice(body)?;
    let mut metadata = current.clone();

    if let Some(first) = doc.tiles.first() {
        let template = first.replace(".png", "{2x}.png");
        metadata.tile_templates = vec![apply_ssl(&template, ssl)];
    }

    let min = doc.minzoom.map(zoom_level).unwrap_or(metadata.zoom.min);
    let max = doc.maxzoom.map(zoom_level).unwrap_or(metadata.zoom.max);
    metadata.zoom = ZoomBounds::new(min, max);

    if let Some(name) = doc.name {
        metadata.name = name;
    }
    if let Some(description) = doc.description {
        metadata.description = description;
    }
    if let Some(attribution) = doc.attribution {
        metadata.attribution = attribution;
    }
    if let Some(legend) = doc.legend {
        metadata.legend = legend;
    }
    if let Some(c) = doc.center.as_ref().and_then(|v| number_list(v, 3)) {
        metadata.center = Some(Center {
            longitude: c[0],
            latitude: c[1],
            zoom: c[2],
        });
    }
    if let Some(b) = doc.bounds.as_ref().and_then(|v| number_list(v, 4)) {
        metadata.bounding_box = Some(BoundingBox {
            west: b[0],
            south: b[1],
            east: b[2],
            north: b[3],
        });
    }

    Ok(metadata)
}

fn zoom_level(value: f64) -> u8 {
    value.clamp(0.0, f64::from(MAX_ZOOM)) as u8
}

fn number_list(value: &Value, len: usize) -> Option<Vec<f64>> {
    let numbers: Vec<f64> = match value {
        Value::Array(items) => items.iter().map(Value::as_f64).collect::<Option<_>>()?,
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok())
            .collect::<Option<_>>()?,
        _ => return None,
    };
    (numbers.len() == len).then_some(numbers)
}

/// A layer described by a remote TileJSON document.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tilestream::provider::ReqwestClient;
/// use tilestream::source::{TileJsonSource, TileSource};
///
/// let http = Arc::new(ReqwestClient::new().unwrap());
/// let source = TileJsonSource::new("terrain", "https://example.com/terrain.json", true, http);
/// source.initialize();
/// ```
pub struct TileJsonSource {
    id: String,
    high_density: bool,
    loader: Arc<RemoteMetadata>,
}

impl TileJsonSource {
    /// Layer configured from the TileJSON document at `url`.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        ssl: bool,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let id = id.into();
        let url = apply_ssl(&url.into(), ssl);
        let defaults = SourceMetadata::named(id.clone(), ZoomBounds::default());
        let loader = RemoteMetadata::new(
            id.clone(),
            url,
            http,
            Box::new(move |body: &[u8], current: &SourceMetadata| {
                parse_tilejson(body, current, ssl)
            }),
            defaults,
        );
        Self {
            id,
            high_density: true,
            loader,
        }
    }

    /// Hosted Mapbox map `map_id` (of the form `account.map`).
    ///
    /// Tiles are served from the map id right away; the branded TileJSON
    /// document refines zoom range and attribution when it arrives. Mapbox
    /// layers never request `@2x` tiles.
    pub fn mapbox(
        map_id: impl Into<String>,
        access_token: &str,
        ssl: bool,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let map_id = map_id.into();
        let template = format!(
            "{}{}/{{z}}/{{x}}/{{y}}{{2x}}.png?access_token={}",
            MAPBOX_BASE_URL, map_id, access_token
        );
        let defaults = SourceMetadata {
            name: map_id.clone(),
            tile_templates: vec![apply_ssl(&template, ssl)],
            ..Default::default()
        };

        let mut json_url = format!(
            "{}{}.json?access_token={}&secure=1",
            MAPBOX_BASE_URL, map_id, access_token
        );
        if !ssl {
            json_url = json_url.replace("https://", "http://").replace("&secure=1", "");
        }

        let loader = RemoteMetadata::new(
            map_id.clone(),
            json_url,
            http,
            Box::new(move |body: &[u8], current: &SourceMetadata| {
                parse_tilejson(body, current, ssl)
            }),
            defaults,
        );
        Self {
            id: map_id,
            high_density: false,
            loader,
        }
    }

    /// URL of the metadata document.
    pub fn metadata_url(&self) -> &str {
        self.loader.url()
    }

    /// Load the metadata on the calling thread.
    pub fn load_metadata(&self) -> Result<(), SourceError> {
        self.loader.load_now()
    }
}

impl TileSource for TileJsonSource {
    fn cache_key_prefix(&self) -> String {
        self.id.clone()
    }

    fn locations_for(&self, key: &TileKey, high_density: bool) -> Vec<FetchLocation> {
        if !self.loader.is_configured() {
            self.loader.ensure_configured();
        }
        let hdpi = high_density && self.high_density;
        self.loader
            .snapshot()
            .tile_templates
            .iter()
            .map(|t| FetchLocation::Remote(expand_template(t, key, hdpi)))
            .collect()
    }

    fn metadata(&self) -> Arc<SourceMetadata> {
        self.loader.snapshot()
    }

    fn is_configured(&self) -> bool {
        self.loader.is_configured()
    }

    fn initialize(&self) {
        self.loader.ensure_configured();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FetchError, MockHttpClient, RoutingHttpClient};

    const DOC: &str = r#"{
        "tilejson": "2.0.0",
        "name": "Terrain",
        "description": "Hillshaded terrain",
        "attribution": "Example Maps",
        "legend": "<b>legend</b>",
        "tiles": ["https://tiles.example.com/terrain/{z}/{x}/{y}.png"],
        "minzoom": 2,
        "maxzoom": 16.0,
        "center": [-122.42, 37.77, 9],
        "bounds": "-180,-85.05,180,85.05"
    }"#;

    fn urls(locations: Vec<FetchLocation>) -> Vec<String> {
        locations
            .into_iter()
            .filter_map(|l| match l {
                FetchLocation::Remote(url) => Some(url),
                FetchLocation::Archive(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_full_document() {
        let meta = parse_tilejson(DOC.as_bytes(), &SourceMetadata::default(), true).unwrap();
        assert_eq!(meta.name, "Terrain");
        assert_eq!(meta.description, "Hillshaded terrain");
        assert_eq!(meta.attribution, "Example Maps");
        assert_eq!(meta.legend, "<b>legend</b>");
        assert_eq!(meta.zoom, ZoomBounds::new(2, 16));
        assert_eq!(
            meta.tile_templates,
            vec!["https://tiles.example.com/terrain/{z}/{x}/{y}{2x}.png"]
        );
        let center = meta.center.unwrap();
        assert_eq!(center.longitude, -122.42);
        assert_eq!(center.latitude, 37.77);
        assert_eq!(center.zoom, 9.0);
        let bounds = meta.bounding_box.unwrap();
        assert_eq!(bounds.west, -180.0);
        assert_eq!(bounds.north, 85.05);
    }

    #[test]
    fn test_parse_without_ssl_downgrades_tiles() {
        let meta = parse_tilejson(DOC.as_bytes(), &SourceMetadata::default(), false).unwrap();
        assert!(meta.tile_templates[0].starts_with("http://tiles.example.com/"));
    }

    #[test]
    fn test_parse_keeps_current_values_for_missing_fields() {
        let current = SourceMetadata {
            name: "fallback".into(),
            zoom: ZoomBounds::new(3, 12),
            tile_templates: vec!["http://old/{z}/{x}/{y}.png".into()],
            ..Default::default()
        };
        let meta = parse_tilejson(br#"{"bounds": [1, 2, 3]}"#, &current, true).unwrap();
        assert_eq!(meta.name, "fallback");
        assert_eq!(meta.zoom, ZoomBounds::new(3, 12));
        assert_eq!(meta.tile_templates, current.tile_templates);
        // Wrong length is ignored
        assert!(meta.bounding_box.is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = parse_tilejson(b"<html>", &SourceMetadata::default(), true);
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_unconfigured_source_has_no_locations() {
        let http = Arc::new(MockHttpClient {
            response: Err(FetchError::Transport("offline".into())),
        });
        let source = TileJsonSource::new("terrain", "https://example.com/t.json", true, http);
        assert!(!source.is_configured());
        assert!(source.load_metadata().is_err());
        assert!(source
            .locations_for(&TileKey::new("terrain", 1, 0, 0), false)
            .is_empty());
    }

    #[test]
    fn test_failed_metadata_retries_on_later_request() {
        use std::time::{Duration, Instant};

        let url = "https://example.com/t.json";
        let http = Arc::new(RoutingHttpClient::default());
        let source = TileJsonSource::new("terrain", url, true, http.clone());
        let key = TileKey::new("terrain", 3, 2, 1);

        // Document unreachable: stays unconfigured, serves nothing
        assert!(source.load_metadata().is_err());
        assert!(!source.is_configured());

        // Service recovers; the next reference reloads in the background
        http.route(url, Ok(DOC.as_bytes().to_vec()));
        assert!(source.locations_for(&key, false).is_empty());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !source.is_configured() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(source.is_configured());
        assert_eq!(http.request_count(), 2);
        assert_eq!(
            urls(source.locations_for(&key, false)),
            vec!["https://tiles.example.com/terrain/3/2/1.png"]
        );
    }

    #[test]
    fn test_configured_source_locations() {
        let http = Arc::new(RoutingHttpClient::default());
        http.route("https://example.com/t.json", Ok(DOC.as_bytes().to_vec()));
        let source = TileJsonSource::new("terrain", "https://example.com/t.json", true, http);
        source.load_metadata().unwrap();

        assert!(source.is_configured());
        assert_eq!(source.bounds(), ZoomBounds::new(2, 16));
        let locs = urls(source.locations_for(&TileKey::new("terrain", 3, 2, 1), true));
        assert_eq!(locs, vec!["https://tiles.example.com/terrain/3/2/1@2x.png"]);
    }

    #[test]
    fn test_mapbox_urls() {
        let http = Arc::new(RoutingHttpClient::default());
        let source = TileJsonSource::mapbox("acme.streets", "tok", true, http);

        assert_eq!(
            source.metadata_url(),
            "https://a.tiles.mapbox.com/v4/acme.streets.json?access_token=tok&secure=1"
        );
        assert_eq!(source.cache_key_prefix(), "acme.streets");

        // Served before metadata arrives, and never at @2x
        let locs = urls(source.locations_for(&TileKey::new("acme.streets", 1, 1, 0), true));
        assert_eq!(
            locs,
            vec!["https://a.tiles.mapbox.com/v4/acme.streets/1/1/0.png?access_token=tok"]
        );
    }

    #[test]
    fn test_mapbox_without_ssl() {
        let http = Arc::new(RoutingHttpClient::default());
        let source = TileJsonSource::mapbox("acme.streets", "tok", false, http);
        assert_eq!(
            source.metadata_url(),
            "http://a.tiles.mapbox.com/v4/acme.streets.json?access_token=tok"
        );
    }
}
