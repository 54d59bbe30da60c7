//! HTTP client abstraction for testability

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use tracing::trace;

use super::types::FetchError;

/// Default User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("tilestream/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default size of the in-memory HTTP response cache (10 MB).
pub const DEFAULT_RESPONSE_CACHE_BYTES: u64 = 10 * 1024 * 1024;

/// Default lifetime of a cached HTTP response.
pub const DEFAULT_RESPONSE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Settings for [`ReqwestClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    /// Response cache budget in bytes; 0 disables the cache.
    pub response_cache_bytes: u64,
    pub response_cache_ttl: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            response_cache_bytes: DEFAULT_RESPONSE_CACHE_BYTES,
            response_cache_ttl: DEFAULT_RESPONSE_CACHE_TTL,
        }
    }
}

/// Real HTTP client implementation using reqwest.
///
/// One instance is meant to be shared (behind an `Arc`) by every fetcher and
/// metadata loader so connections are pooled. Successful response bodies can
/// be kept in a small byte-weighted `moka` cache, which absorbs repeated
/// requests for the same URL (metadata documents, tiles evicted from the
/// memory tier and requested again shortly after).
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    responses: Option<MokaCache<String, Arc<Vec<u8>>>>,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(&HttpSettings::default())
    }

    /// Creates a new ReqwestClient with custom settings.
    pub fn with_settings(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let responses = (settings.response_cache_bytes > 0).then(|| {
            MokaCache::builder()
                // Weight each entry by its body size
                .weigher(|_url: &String, body: &Arc<Vec<u8>>| -> u32 {
                    body.len().min(u32::MAX as usize) as u32
                })
                .max_capacity(settings.response_cache_bytes)
                .time_to_live(settings.response_cache_ttl)
                .build()
        });

        Ok(Self { client, responses })
    }

    fn fetch_uncached(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|e| map_reqwest_error(url, e))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Read response body
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| map_reqwest_error(url, e))
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let Some(responses) = &self.responses else {
            return self.fetch_uncached(url);
        };

        if let Some(body) = responses.get(url) {
            trace!(url, "HTTP response cache hit");
            return Ok(body.as_ref().clone());
        }

        let body = self.fetch_uncached(url)?;
        responses.insert(url.to_string(), Arc::new(body.clone()));
        Ok(body)
    }
}

fn map_reqwest_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Transport(format!("Request to {} failed: {}", url, e))
    }
}
