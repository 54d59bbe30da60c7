//! Bing Maps imagery layers.
//!
//! Bing publishes its tile URL through an imagery metadata REST call that
//! requires an API key. The returned URL template addresses tiles by
//! quadkey and contains `{subdomain}` and `{culture}` placeholders, which are
//! resolved once when the metadata arrives.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use super::metadata::RemoteMetadata;
use super::template::expand_template;
use super::types::{FetchLocation, SourceError, SourceMetadata, TileSource};
use crate::coord::{TileKey, ZoomBounds};
use crate::provider::HttpClient;

/// Default Bing zoom range until metadata says otherwise.
pub const BING_DEFAULT_ZOOM: ZoomBounds = ZoomBounds { min: 1, max: 22 };

const METADATA_URL: &str = "http://dev.virtualearth.net/REST/V1/Imagery/Metadata";

/// Bing imagery set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BingImagery {
    Aerial,
    AerialWithLabels,
    #[default]
    Road,
}

impl BingImagery {
    pub fn as_str(&self) -> &'static str {
        match self {
            BingImagery::Aerial => "Aerial",
            BingImagery::AerialWithLabels => "AerialWithLabels",
            BingImagery::Road => "Road",
        }
    }
}

impl fmt::Display for BingImagery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BingImagery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aerial" => Ok(BingImagery::Aerial),
            "aerialwithlabels" => Ok(BingImagery::AerialWithLabels),
            "road" => Ok(BingImagery::Road),
            other => Err(format!("unknown Bing imagery set '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageryMetadataResponse {
    status_code: u16,
    authentication_result_code: String,
    #[serde(default)]
    resource_sets: Vec<ResourceSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSet {
    estimated_total: u64,
    #[serde(default)]
    resources: Vec<ImageryResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageryResource {
    image_url: String,
    #[serde(default)]
    image_url_subdomains: Vec<String>,
    #[serde(alias = "ZoomMin")]
    zoom_min: Option<u8>,
    #[serde(alias = "ZoomMax")]
    zoom_max: Option<u8>,
}

/// Parse and validate a Bing imagery metadata response.
///
/// # Errors
///
/// [`SourceError::Rejected`] when the status is not 200, the credentials are
/// not valid, or no imagery resource is returned; [`SourceError::Parse`] for
/// malformed JSON.
pub fn parse_imagery_metadata(
    body: &[u8],
    current: &SourceMetadata,
) -> Result<SourceMetadata, SourceError> {
    let response: ImageryMetadataResponse = serde_json::from_slice(body)?;

    if response.status_code != 200 {
        return Err(SourceError::Rejected(format!(
            "status code {}",
            response.status_code
        )));
    }
    if !response
        .authentication_result_code
        .eq_ignore_ascii_case("ValidCredentials")
    {
        return Err(SourceError::Rejected(format!(
            "authentication result {}",
            response.authentication_result_code
        )));
    }
    let set = response
        .resource_sets
        .first()
        .ok_or_else(|| SourceError::Rejected("no resource set in response".into()))?;
    if set.estimated_total == 0 {
        return Err(SourceError::Rejected("no imagery resource in response".into()));
    }
    let resource = set
        .resources
        .first()
        .ok_or_else(|| SourceError::Rejected("empty resource list".into()))?;

    let mut url = resource.image_url.replace("{culture}", "en");
    if let Some(subdomain) = resource.image_url_subdomains.first() {
        url = url.replace("{subdomain}", subdomain);
    }

    let mut metadata = current.clone();
    metadata.zoom = ZoomBounds::new(
        resource.zoom_min.unwrap_or(current.zoom.min),
        resource.zoom_max.unwrap_or(current.zoom.max),
    );
    metadata.tile_templates = vec![url];
    Ok(metadata)
}

/// A Bing Maps imagery layer.
pub struct BingSource {
    imagery: BingImagery,
    loader: Arc<RemoteMetadata>,
}

impl BingSource {
    /// # Arguments
    ///
    /// * `api_key` - Bing Maps key
    /// * `imagery` - Imagery set to show
    /// * `http` - Shared HTTP client
    pub fn new(api_key: &str, imagery: BingImagery, http: Arc<dyn HttpClient>) -> Self {
        let url = format!(
            "{}/{}?mapVersion=v1&output=json&key={}",
            METADATA_URL, imagery, api_key
        );
        let defaults = SourceMetadata {
            name: format!("Bing {}", imagery),
            attribution: "© Microsoft".to_string(),
            zoom: BING_DEFAULT_ZOOM,
            ..Default::default()
        };
        let loader = RemoteMetadata::new(
            format!("bing-{}", imagery.as_str().to_ascii_lowercase()),
            url,
            http,
            Box::new(|body: &[u8], current: &SourceMetadata| {
                parse_imagery_metadata(body, current)
            }),
            defaults,
        );
        Self { imagery, loader }
    }

    pub fn imagery(&self) -> BingImagery {
        self.imagery
    }

    pub fn metadata_url(&self) -> &str {
        self.loader.url()
    }

    /// Load the metadata on the calling thread.
    pub fn load_metadata(&self) -> Result<(), SourceError> {
        self.loader.load_now()
    }
}

impl TileSource for BingSource {
    fn cache_key_prefix(&self) -> String {
        format!("Bing {}", self.imagery)
    }

    fn locations_for(&self, key: &TileKey, _high_density: bool) -> Vec<FetchLocation> {
        if !self.loader.is_configured() {
            self.loader.ensure_configured();
            return Vec::new();
        }
        self.loader
            .snapshot()
            .tile_templates
            .iter()
            .map(|t| FetchLocation::Remote(expand_template(t, key, false)))
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

    const OK_RESPONSE: &str = r#"{
        "authenticationResultCode": "ValidCredentials",
        "statusCode": 200,
        "resourceSets": [{
            "estimatedTotal": 1,
            "resources": [{
                "imageUrl": "http://ecn.{subdomain}.tiles.virtualearth.net/tiles/r{quadkey}.jpeg?g=1&mkt={culture}",
                "imageUrlSubdomains": ["t0", "t1", "t2", "t3"],
                "zoomMin": 1,
                "zoomMax": 21
            }]
        }]
    }"#;

    fn base() -> SourceMetadata {
        SourceMetadata {
            zoom: BING_DEFAULT_ZOOM,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_valid_response() {
        let meta = parse_imagery_metadata(OK_RESPONSE.as_bytes(), &base()).unwrap();
        assert_eq!(
            meta.tile_templates,
            vec!["http://ecn.t0.tiles.virtualearth.net/tiles/r{quadkey}.jpeg?g=1&mkt=en"]
        );
        assert_eq!(meta.zoom, ZoomBounds::new(1, 21));
    }

    #[test]
    fn test_parse_accepts_capitalized_zoom_fields() {
        let body = OK_RESPONSE
            .replace("zoomMin", "ZoomMin")
            .replace("zoomMax\": 21", "ZoomMax\": 19");
        let meta = parse_imagery_metadata(body.as_bytes(), &base()).unwrap();
        assert_eq!(meta.zoom, ZoomBounds::new(1, 19));
    }

    #[test]
    fn test_parse_rejects_bad_status() {
        let body = OK_RESPONSE.replace("\"statusCode\": 200", "\"statusCode\": 401");
        let err = parse_imagery_metadata(body.as_bytes(), &base()).unwrap_err();
        assert!(matches!(err, SourceError::Rejected(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_credentials() {
        let body = OK_RESPONSE.replace("ValidCredentials", "InvalidCredentials");
        assert!(matches!(
            parse_imagery_metadata(body.as_bytes(), &base()),
            Err(SourceError::Rejected(_))
        ));
    }

    #[test]
    fn test_parse_accepts_credentials_case_insensitively() {
        let body = OK_RESPONSE.replace("ValidCredentials", "validcredentials");
        assert!(parse_imagery_metadata(body.as_bytes(), &base()).is_ok());
    }

    #[test]
    fn test_parse_rejects_empty_results() {
        let body = OK_RESPONSE.replace("\"estimatedTotal\": 1", "\"estimatedTotal\": 0");
        assert!(matches!(
            parse_imagery_metadata(body.as_bytes(), &base()),
            Err(SourceError::Rejected(_))
        ));

        let no_sets = r#"{"statusCode": 200, "authenticationResultCode": "ValidCredentials", "resourceSets": []}"#;
        assert!(matches!(
            parse_imagery_metadata(no_sets.as_bytes(), &base()),
            Err(SourceError::Rejected(_))
        ));
    }

    #[test]
    fn test_source_defaults_and_url() {
        let http = Arc::new(MockHttpClient {
            response: Err(FetchError::Transport("offline".into())),
        });
        let source = BingSource::new("KEY", BingImagery::Aerial, http);

        assert_eq!(
            source.metadata_url(),
            "http://dev.virtualearth.net/REST/V1/Imagery/Metadata/Aerial?mapVersion=v1&output=json&key=KEY"
        );
        assert_eq!(source.cache_key_prefix(), "Bing Aerial");
        assert_eq!(source.bounds(), ZoomBounds::new(1, 22));
        assert!(!source.is_configured());
    }

    #[test]
    fn test_configured_source_uses_quadkeys() {
        let http = Arc::new(RoutingHttpClient::default());
        let source = BingSource::new("KEY", BingImagery::Road, http.clone());
        http.route(source.metadata_url(), Ok(OK_RESPONSE.as_bytes().to_vec()));

        source.load_metadata().unwrap();
        let locations = source.locations_for(&TileKey::new("bing", 3, 3, 5), true);
        assert_eq!(locations.len(), 1);
        match &locations[0] {
            FetchLocation::Remote(url) => assert_eq!(
                url,
                "http://ecn.t0.tiles.virtualearth.net/tiles/r213.jpeg?g=1&mkt=en"
            ),
            other => panic!("unexpected location {:?}", other),
        }
    }

    #[test]
    fn test_imagery_from_str() {
        assert_eq!("aerial".parse::<BingImagery>(), Ok(BingImagery::Aerial));
        assert_eq!(
            "AerialWithLabels".parse::<BingImagery>(),
            Ok(BingImagery::AerialWithLabels)
        );
        assert!("satellite".parse::<BingImagery>().is_err());
    }
}
