//! tilestream - tile cache and asynchronous tile-loading pipeline
//!
//! Map imagery is split into square raster tiles addressed by zoom, x and y.
//! This library decides for every requested tile whether a usable image is
//! already in memory or on disk, fetches it from local archives or the
//! network otherwise, composites multi-layer sources, stores the result
//! with bounded LRU eviction, and hands it to the consumer thread without
//! ever blocking it.
//!
//! Start with [`app::TileServiceBuilder`].

pub mod app;
pub mod cache;
pub mod chain;
pub mod config;
pub mod coord;
pub mod delivery;
pub mod executor;
pub mod logging;
pub mod provider;
pub mod source;
pub mod tile;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
