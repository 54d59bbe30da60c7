//! Decoded tile rasters.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};

use crate::provider::FetchError;

/// Where a [`TileImage`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Served from the in-memory tier.
    MemoryCache,
    /// Read from the disk tier and promoted into memory.
    DiskCache,
    /// Fetched from a single backing location.
    Fetched,
    /// Alpha-composited from several backing locations.
    Composited,
}

impl Provenance {
    /// Short label used in log output and CLI reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::MemoryCache => "memory",
            Provenance::DiskCache => "disk",
            Provenance::Fetched => "fetched",
            Provenance::Composited => "composited",
        }
    }
}

/// A decoded RGBA8 tile.
///
/// The pixel buffer is reference counted: cloning a `TileImage` shares the
/// buffer with the cache entry it came from, and the memory is released when
/// the last holder drops it.
#[derive(Debug, Clone)]
pub struct TileImage {
    pixels: Arc<RgbaImage>,
    provenance: Provenance,
}

impl TileImage {
    /// Wrap an already decoded raster.
    pub fn new(pixels: RgbaImage, provenance: Provenance) -> Self {
        Self {
            pixels: Arc::new(pixels),
            provenance,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the decoded raster.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes, row major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Memory cost of the raster in bytes; the unit of the cache budgets.
    pub fn weight(&self) -> u64 {
        self.pixels.as_raw().len() as u64
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Same pixels, relabelled. The buffer is shared, not copied.
    pub fn with_provenance(&self, provenance: Provenance) -> Self {
        Self {
            pixels: Arc::clone(&self.pixels),
            provenance,
        }
    }

    /// True when the image was served by one of the cache tiers.
    pub fn is_cache_hit(&self) -> bool {
        matches!(
            self.provenance,
            Provenance::MemoryCache | Provenance::DiskCache
        )
    }

    /// True when both images share one pixel buffer.
    pub fn shares_pixels(&self, other: &TileImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// Decode PNG/JPEG/WebP bytes into a tile.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] when the bytes are not a supported image.
pub fn decode(bytes: &[u8]) -> Result<TileImage, FetchError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(TileImage::new(decoded.to_rgba8(), Provenance::Fetched))
}

/// Encode a tile as lossless PNG, the on-disk cache format.
pub fn encode_png(tile: &TileImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    tile.pixels().write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(color: [u8; 4]) -> TileImage {
        TileImage::new(RgbaImage::from_pixel(4, 4, Rgba(color)), Provenance::Fetched)
    }

    #[test]
    fn test_weight_is_raw_length() {
        let tile = solid([1, 2, 3, 4]);
        assert_eq!(tile.weight(), 4 * 4 * 4);
        assert_eq!(tile.width(), 4);
        assert_eq!(tile.height(), 4);
    }

    #[test]
    fn test_with_provenance_shares_buffer() {
        let tile = solid([0, 0, 0, 255]);
        let hit = tile.with_provenance(Provenance::MemoryCache);
        assert!(hit.shares_pixels(&tile));
        assert!(hit.is_cache_hit());
        assert!(!tile.is_cache_hit());
    }

    #[test]
    fn test_png_roundtrip_is_lossless() {
        let tile = solid([10, 20, 30, 128]);
        let bytes = encode_png(&tile).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.as_raw(), tile.as_raw());
        assert_eq!(decoded.provenance(), Provenance::Fetched);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode(b"definitely not an image");
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }
}
