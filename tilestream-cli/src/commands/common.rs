//! Source selection and service construction shared by the tile commands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use tilestream::app::{TileService, TileServiceBuilder};
use tilestream::config::TileStreamConfig;
use tilestream::delivery::DeliveryReceiver;
use tilestream::provider::{HttpClient, ReqwestClient};
use tilestream::source::{
    ArchiveSource, BingImagery, BingSource, TileJsonSource, TileSource, UrlTemplateSource,
};

use crate::error::CliError;

/// Kind of network source.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SourceKind {
    /// URL template with {z}, {x}, {y}, {2x} and {quadkey} placeholders
    Template,
    /// TileJSON document describing the layer
    Tilejson,
    /// Hosted Mapbox map (requires --map-id and --key)
    Mapbox,
    /// Bing Maps imagery (requires --key)
    Bing,
    /// Local archives only
    None,
}

/// Where tiles come from.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Network source kind
    #[arg(long, value_enum, default_value_t = SourceKind::Template)]
    pub source: SourceKind,

    /// URL template or TileJSON URL
    #[arg(long, default_value = "https://tile.openstreetmap.org/{z}/{x}/{y}.png")]
    pub url: String,

    /// Mapbox map id
    #[arg(long)]
    pub map_id: Option<String>,

    /// Mapbox access token or Bing Maps key
    #[arg(long)]
    pub key: Option<String>,

    /// Bing imagery set: aerial, aerialwithlabels, road
    #[arg(long, default_value = "road")]
    pub imagery: String,

    /// Directory whose subdirectories are tile archives, tried before the network
    #[arg(long)]
    pub archives: Option<PathBuf>,

    /// File extension of archive tiles
    #[arg(long, default_value = "png")]
    pub archive_ext: String,

    /// Layer id used in cache keys
    #[arg(long, default_value = "default")]
    pub id: String,

    /// Downgrade https URLs to http
    #[arg(long)]
    pub no_ssl: bool,
}

/// A running service plus the id tile keys should use.
pub struct Pipeline {
    pub service: TileService,
    pub receiver: DeliveryReceiver,
    pub layer_id: String,
}

/// Load the configuration, from `path` or the default location.
pub fn load_config(path: Option<&PathBuf>) -> Result<TileStreamConfig, CliError> {
    let path = path
        .cloned()
        .unwrap_or_else(tilestream::config::config_file_path);
    Ok(TileStreamConfig::load(&path)?)
}

/// Build the network source selected by `args`, if any.
fn network_source(
    args: &SourceArgs,
    http: &Arc<dyn HttpClient>,
) -> Result<Option<Arc<dyn TileSource>>, CliError> {
    let ssl = !args.no_ssl;
    let source: Arc<dyn TileSource> = match args.source {
        SourceKind::None => return Ok(None),
        SourceKind::Template => Arc::new(UrlTemplateSource::new(args.id.clone(), &args.url, ssl)),
        SourceKind::Tilejson => Arc::new(TileJsonSource::new(
            args.id.clone(),
            args.url.clone(),
            ssl,
            Arc::clone(http),
        )),
        SourceKind::Mapbox => {
            let map_id = args
                .map_id
                .clone()
                .ok_or_else(|| CliError::Config("--map-id is required for Mapbox".to_string()))?;
            let token = args
                .key
                .as_deref()
                .ok_or_else(|| CliError::Config("--key is required for Mapbox".to_string()))?;
            Arc::new(TileJsonSource::mapbox(map_id, token, ssl, Arc::clone(http)))
        }
        SourceKind::Bing => {
            let key = args
                .key
                .as_deref()
                .ok_or_else(|| CliError::Config("--key is required for Bing".to_string()))?;
            let imagery: BingImagery = args.imagery.parse().map_err(CliError::Config)?;
            Arc::new(BingSource::new(key, imagery, Arc::clone(http)))
        }
    };
    Ok(Some(source))
}

/// Build and start the pipeline described by `args`.
pub fn build_pipeline(config: TileStreamConfig, args: &SourceArgs) -> Result<Pipeline, CliError> {
    let http: Arc<dyn HttpClient> = Arc::new(
        ReqwestClient::with_settings(&config.http_settings())
            .map_err(|e| CliError::Config(e.to_string()))?,
    );

    let mut builder = TileServiceBuilder::new(config).with_http_client(Arc::clone(&http));
    let mut layer_id = args.id.clone();

    if let Some(root) = &args.archives {
        let archives = ArchiveSource::discover(args.id.clone(), root.clone(), &args.archive_ext)
            .map_err(|e| CliError::Config(format!("cannot read {}: {}", root.display(), e)))?;
        builder = builder.archive_provider("archive", Arc::new(archives));
    }

    if let Some(source) = network_source(args, &http)? {
        layer_id = source.cache_key_prefix();
        builder = builder.network_provider("network", source);
    }

    let (service, receiver) = builder.build()?;
    Ok(Pipeline {
        service,
        receiver,
        layer_id,
    })
}
