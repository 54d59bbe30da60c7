//! `tilestream fetch`: load one tile through the pipeline and save it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Args;
use tilestream::coord::MAX_ZOOM;
use tilestream::delivery::TileOutcome;
use tilestream::tile::encode_png;

use super::common::{build_pipeline, load_config, SourceArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Zoom level
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=i64::from(MAX_ZOOM)))]
    pub zoom: u8,

    /// Tile column
    #[arg(short, long)]
    pub x: u32,

    /// Tile row
    #[arg(short, long)]
    pub y: u32,

    /// Output PNG path (default: {z}-{x}-{y}.png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Seconds to wait for the tile
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn run(args: FetchArgs, config_path: Option<&PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let mut pipeline = build_pipeline(config, &args.source)?;
    let key = pipeline
        .service
        .tile_key(&pipeline.layer_id, args.zoom, args.x, args.y);

    println!("Fetching {}", key);

    let slot: Arc<Mutex<Option<TileOutcome>>> = Arc::new(Mutex::new(None));
    {
        let slot = Arc::clone(&slot);
        pipeline.service.request(key.clone(), move |outcome| {
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(outcome);
            }
        });
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let outcome = loop {
        pipeline.receiver.dispatch_timeout(Duration::from_millis(100));
        if let Some(outcome) = slot.lock().ok().and_then(|mut s| s.take()) {
            break outcome;
        }
        if Instant::now() >= deadline {
            pipeline.service.shutdown();
            return Err(CliError::Timeout(args.timeout));
        }
    };
    pipeline.service.shutdown();

    let tile = outcome.map_err(CliError::Tile)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}-{}-{}.png", args.zoom, args.x, args.y)));
    let bytes = encode_png(&tile).map_err(|e| CliError::FileWrite {
        path: output.display().to_string(),
        error: std::io::Error::other(e),
    })?;
    std::fs::write(&output, bytes).map_err(|error| CliError::FileWrite {
        path: output.display().to_string(),
        error,
    })?;

    println!(
        "Saved {}x{} tile ({}) to {}",
        tile.width(),
        tile.height(),
        tile.provenance().as_str(),
        output.display()
    );
    Ok(())
}
