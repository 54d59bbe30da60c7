//! Decoded tile images.
//!
//! A [`TileImage`] is the unit stored by the cache tiers and handed to
//! consumers. Fetched bytes are decoded once into RGBA8 and shared by
//! reference count from then on; several source layers can be merged into one
//! tile with [`composite`].

mod compose;
mod raster;

pub use self::compose::composite;
pub use self::raster::{decode, encode_png, Provenance, TileImage};
