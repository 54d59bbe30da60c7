//! Service construction and lifecycle.
//!
//! [`TileService`] owns the cache, the provider chain, and the sending side of
//! the delivery channel. It is built explicitly with [`TileServiceBuilder`]
//! and torn down with [`TileService::shutdown`] (or on drop); there is no
//! global instance.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::error::AppError;
use crate::cache::{CacheStatsSnapshot, TileCache};
use crate::chain::ProviderChain;
use crate::config::TileStreamConfig;
use crate::coord::{TileKey, TileVariant};
use crate::delivery::{delivery_channel, DeliveryReceiver, DeliverySink, TileOutcome};
use crate::executor::PoolConfig;
use crate::provider::{HttpClient, ReqwestClient, TileFetcher, TileProvider};
use crate::source::TileSource;

enum PoolKind {
    Archive,
    Network,
}

enum ProviderSpec {
    Source {
        name: String,
        source: Arc<dyn TileSource>,
        pool: PoolKind,
    },
    Custom {
        provider: Arc<dyn TileProvider>,
        pool: PoolConfig,
    },
}

/// Builder for [`TileService`].
///
/// Providers are tried in the order they are added.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use tilestream::app::TileServiceBuilder;
/// use tilestream::config::TileStreamConfig;
/// use tilestream::source::{ArchiveSource, UrlTemplateSource};
///
/// let archives = ArchiveSource::discover("osm", Path::new("/data/archives"), "png").unwrap();
/// let online = UrlTemplateSource::new("osm", "https://tile.openstreetmap.org/{z}/{x}/{y}.png", true);
///
/// let (service, mut receiver) = TileServiceBuilder::new(TileStreamConfig::default())
///     .archive_provider("archive", Arc::new(archives))
///     .network_provider("network", Arc::new(online))
///     .build()
///     .unwrap();
///
/// service.request(service.tile_key("osm", 3, 2, 1), |outcome| {
///     println!("tile ready: {}", outcome.is_ok());
/// });
/// receiver.dispatch_blocking();
/// ```
pub struct TileServiceBuilder {
    config: TileStreamConfig,
    http: Option<Arc<dyn HttpClient>>,
    providers: Vec<ProviderSpec>,
}

impl TileServiceBuilder {
    pub fn new(config: TileStreamConfig) -> Self {
        Self {
            config,
            http: None,
            providers: Vec::new(),
        }
    }

    /// Start from the configuration file at `path` (defaults if missing).
    pub fn from_config_file(path: &Path) -> Result<Self, AppError> {
        Ok(Self::new(TileStreamConfig::load(path)?))
    }

    /// Share this client across every fetcher instead of building one from
    /// the `[network]` settings.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Add a filesystem-backed source, drained by the archive pool.
    pub fn archive_provider(mut self, name: impl Into<String>, source: Arc<dyn TileSource>) -> Self {
        self.providers.push(ProviderSpec::Source {
            name: name.into(),
            source,
            pool: PoolKind::Archive,
        });
        self
    }

    /// Add a network source, drained by the network pool.
    pub fn network_provider(mut self, name: impl Into<String>, source: Arc<dyn TileSource>) -> Self {
        self.providers.push(ProviderSpec::Source {
            name: name.into(),
            source,
            pool: PoolKind::Network,
        });
        self
    }

    /// Add an arbitrary provider with its own pool sizing.
    ///
    /// Custom providers are responsible for writing to the cache themselves.
    pub fn provider(mut self, provider: Arc<dyn TileProvider>, pool: PoolConfig) -> Self {
        self.providers.push(ProviderSpec::Custom { provider, pool });
        self
    }

    /// Build the service.
    ///
    /// Returns the service together with the receiver that must be polled on
    /// the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or worker
    /// threads cannot be spawned.
    pub fn build(self) -> Result<(TileService, DeliveryReceiver), AppError> {
        let Self {
            config,
            http,
            providers,
        } = self;

        let cache = Arc::new(TileCache::new(config.cache_config()));

        let needs_http = providers
            .iter()
            .any(|spec| matches!(spec, ProviderSpec::Source { .. }));
        let http: Option<Arc<dyn HttpClient>> = match http {
            Some(http) => Some(http),
            None if needs_http => Some(Arc::new(
                ReqwestClient::with_settings(&config.http_settings()).map_err(AppError::HttpClient)?,
            )),
            None => None,
        };

        let mut chain_providers: Vec<(Arc<dyn TileProvider>, PoolConfig)> =
            Vec::with_capacity(providers.len());
        for spec in providers {
            match spec {
                ProviderSpec::Source { name, source, pool } => {
                    let Some(http) = http.as_ref() else {
                        continue;
                    };
                    source.initialize();
                    let pool = match pool {
                        PoolKind::Archive => config.archive_pool(),
                        PoolKind::Network => config.network_pool(),
                    };
                    let fetcher = TileFetcher::new(name, source, Arc::clone(http), Arc::clone(&cache));
                    chain_providers.push((Arc::new(fetcher), pool));
                }
                ProviderSpec::Custom { provider, pool } => chain_providers.push((provider, pool)),
            }
        }

        let (sink, receiver) = delivery_channel();
        let chain = ProviderChain::new(Arc::clone(&cache), chain_providers, sink.clone())
            .map_err(AppError::WorkerSpawn)?;

        let variant = if config.display.high_density {
            TileVariant::HighDensity
        } else {
            TileVariant::Standard
        };

        info!(
            providers = ?chain.provider_names(),
            cache_dir = ?cache.directory(),
            disk_enabled = cache.is_disk_cache_enabled(),
            high_density = config.display.high_density,
            "Tile service started"
        );

        Ok((
            TileService {
                chain,
                cache,
                sink,
                variant,
            },
            receiver,
        ))
    }
}

/// Running tile pipeline.
pub struct TileService {
    chain: ProviderChain,
    cache: Arc<TileCache>,
    sink: DeliverySink,
    variant: TileVariant,
}

impl TileService {
    /// Ask for a tile; `on_result` runs once on the delivery thread.
    pub fn request<F>(&self, key: TileKey, on_result: F)
    where
        F: FnOnce(TileOutcome) + Send + Sync + 'static,
    {
        self.chain.request(key, Box::new(on_result));
    }

    /// Ask the consumer to repaint the rectangle of `key`.
    pub fn invalidate_region(&self, key: &TileKey) {
        self.sink.invalidate(key.clone());
    }

    /// Turn the disk tier on or off. Idempotent; memory is untouched.
    pub fn set_disk_cache_enabled(&self, enabled: bool) -> Result<(), AppError> {
        self.cache.set_disk_cache_enabled(enabled)?;
        Ok(())
    }

    pub fn purge_memory(&self) {
        self.cache.purge_memory();
    }

    pub fn purge_disk(&self) -> Result<(), AppError> {
        self.cache.purge_disk()?;
        Ok(())
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    /// Requests currently queued or being fetched.
    pub fn in_flight(&self) -> usize {
        self.chain.in_flight()
    }

    /// Key for `(zoom, x, y)` of `source_id` in the configured display density.
    pub fn tile_key(&self, source_id: &str, zoom: u8, x: u32, y: u32) -> TileKey {
        TileKey::new(source_id, zoom, x, y).with_variant(self.variant)
    }

    /// Stop the pipeline. Waiting requests are answered with
    /// [`TileError::ShuttingDown`](crate::chain::TileError::ShuttingDown).
    pub fn shutdown(&self) {
        self.chain.shutdown();
    }
}
