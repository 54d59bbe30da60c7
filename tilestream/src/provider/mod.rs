//! Tile providers.
//!
//! A [`TileProvider`] is anything that can produce a decoded tile for a key
//! on a worker thread. The standard implementation, [`TileFetcher`], resolves
//! locations through a [`TileSource`](crate::source::TileSource), downloads
//! remote ones with an [`HttpClient`], reads archive ones directly, and
//! writes the result through to the cache.
//!
//! # Shared HTTP client
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilestream::provider::{HttpSettings, ReqwestClient};
//!
//! let http = Arc::new(ReqwestClient::with_settings(&HttpSettings::default())?);
//! // Hand clones of `http` to every fetcher and metadata loader
//! ```

mod fetcher;
mod http;
mod types;

pub use fetcher::TileFetcher;
pub use http::{
    HttpClient, HttpSettings, ReqwestClient, DEFAULT_RESPONSE_CACHE_BYTES,
    DEFAULT_RESPONSE_CACHE_TTL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use types::{FetchError, TileProvider};

#[cfg(test)]
pub use http::tests::{MockHttpClient, RoutingHttpClient};
