//! `tilestream prefetch`: warm the cache for a square of tiles.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tilestream::chain::TileError;
use tilestream::coord::{sort_center_first, TileKey, MAX_ZOOM};
use tracing::{info, warn};

use super::common::{build_pipeline, load_config, SourceArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct PrefetchArgs {
    /// Zoom level
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=i64::from(MAX_ZOOM)))]
    pub zoom: u8,

    /// Center column
    #[arg(short, long)]
    pub x: u32,

    /// Center row
    #[arg(short, long)]
    pub y: u32,

    /// Tiles on each side of the center
    #[arg(
        short,
        long,
        default_value_t = 2,
        value_parser = clap::value_parser!(u32).range(0..=MAX_RADIUS)
    )]
    pub radius: u32,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Largest accepted `--radius`, a 257 x 257 square.
const MAX_RADIUS: i64 = 128;

#[derive(Default)]
struct Tally {
    loaded: AtomicUsize,
    cached: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
}

/// Keys of the square around the center, clipped to the grid, center first.
fn square(layer: &str, zoom: u8, cx: u32, cy: u32, radius: u32) -> Vec<TileKey> {
    let last = 1u64
        .checked_shl(u32::from(zoom))
        .map_or(u32::MAX, |n| (n - 1).min(u64::from(u32::MAX)) as u32);
    let (x0, x1) = (cx.saturating_sub(radius), cx.saturating_add(radius).min(last));
    let (y0, y1) = (cy.saturating_sub(radius), cy.saturating_add(radius).min(last));

    let mut keys: Vec<TileKey> = (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| (x, y)))
        .map(|(x, y)| TileKey::new(layer, zoom, x, y))
        .collect();
    sort_center_first(&mut keys, cx, cy);
    keys
}

pub fn run(args: PrefetchArgs, config_path: Option<&PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let window = config.pool.queue_size.max(1);
    let mut pipeline = build_pipeline(config, &args.source)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!(error = %e, "Could not install Ctrl-C handler");
        }
    }

    let keys = square(&pipeline.layer_id, args.zoom, args.x, args.y, args.radius);
    let total = keys.len();
    let tally = Arc::new(Tally::default());
    let done = Arc::new(AtomicUsize::new(0));
    info!(total, zoom = args.zoom, "Prefetch started");

    let mut pending = keys.into_iter();
    let mut submitted = 0usize;
    while done.load(Ordering::SeqCst) < submitted || submitted < total {
        if stop.load(Ordering::SeqCst) {
            println!("Interrupted");
            break;
        }

        // Keep the provider queues below capacity so nothing is dropped
        while submitted - done.load(Ordering::SeqCst) < window {
            let Some(key) = pending.next() else {
                break;
            };
            let tally = Arc::clone(&tally);
            let done = Arc::clone(&done);
            pipeline.service.request(key, move |outcome| {
                let counter = match &outcome {
                    Ok(tile) if tile.is_cache_hit() => &tally.cached,
                    Ok(_) => &tally.loaded,
                    Err(TileError::Dropped) => &tally.dropped,
                    Err(_) => &tally.failed,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
            submitted += 1;
        }

        pipeline.receiver.dispatch_timeout(Duration::from_millis(100));
    }

    pipeline.service.shutdown();
    pipeline.receiver.dispatch_pending();

    println!(
        "{} tiles: {} fetched, {} already cached, {} failed, {} dropped",
        total,
        tally.loaded.load(Ordering::SeqCst),
        tally.cached.load(Ordering::SeqCst),
        tally.failed.load(Ordering::SeqCst),
        tally.dropped.load(Ordering::SeqCst),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_is_clipped_and_center_first() {
        let keys = square("t", 2, 0, 0, 1);
        let coords: Vec<(u32, u32)> = keys.iter().map(|k| (k.x(), k.y())).collect();
        assert_eq!(coords.len(), 4);
        assert_eq!(coords[0], (0, 0));
        assert_eq!(*coords.last().unwrap(), (1, 1));
    }

    #[derive(Debug, clap::Parser)]
    struct Harness {
        #[command(flatten)]
        args: PrefetchArgs,
    }

    fn parse(argv: &[&str]) -> Result<PrefetchArgs, clap::Error> {
        use clap::Parser;
        let argv = std::iter::once("prefetch").chain(argv.iter().copied());
        Harness::try_parse_from(argv).map(|h| h.args)
    }

    #[test]
    fn test_zoom_and_radius_are_bounded() {
        let ok = parse(&["--zoom", "22", "-x", "5", "-y", "7", "--radius", "128"]).unwrap();
        assert_eq!((ok.zoom, ok.radius), (22, 128));

        assert!(parse(&["--zoom", "23", "-x", "0", "-y", "0"]).is_err());
        assert!(parse(&["--zoom", "64", "-x", "0", "-y", "0"]).is_err());
        assert!(parse(&["--zoom", "3", "-x", "0", "-y", "0", "--radius", "129"]).is_err());
    }

    #[test]
    fn test_square_at_zoom_zero() {
        let keys = square("t", 0, 0, 0, 3);
        assert_eq!(keys.len(), 1);
    }
}
