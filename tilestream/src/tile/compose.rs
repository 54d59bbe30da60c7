//! Layer compositing.

use image::imageops;

use super::raster::{Provenance, TileImage};

/// Alpha-composite layers in order, later layers drawn over earlier ones.
///
/// Every layer is drawn at the origin; the canvas takes the size of the first
/// layer, so a larger upper layer is clipped to it. A single layer is returned
/// unchanged. Returns `None` for an empty slice.
pub fn composite(layers: &[TileImage]) -> Option<TileImage> {
    let (base, rest) = layers.split_first()?;
    if rest.is_empty() {
        return Some(base.clone());
    }

    let mut canvas = base.pixels().clone();
    for layer in rest {
        imageops::overlay(&mut canvas, layer.pixels(), 0, 0);
    }
    Some(TileImage::new(canvas, Provenance::Composited))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(color: [u8; 4]) -> TileImage {
        TileImage::new(RgbaImage::from_pixel(2, 2, Rgba(color)), Provenance::Fetched)
    }

    #[test]
    fn test_empty_is_none() {
        assert!(composite(&[]).is_none());
    }

    #[test]
    fn test_single_layer_passthrough() {
        let layer = solid([255, 0, 0, 255]);
        let result = composite(std::slice::from_ref(&layer)).unwrap();
        assert!(result.shares_pixels(&layer));
        assert_eq!(result.provenance(), Provenance::Fetched);
    }

    #[test]
    fn test_opaque_upper_layer_wins() {
        let base = solid([255, 0, 0, 255]);
        let top = solid([0, 0, 255, 255]);
        let result = composite(&[base, top]).unwrap();
        assert_eq!(result.provenance(), Provenance::Composited);
        assert_eq!(result.pixels().get_pixel(1, 1), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_transparent_upper_layer_keeps_base() {
        let base = solid([0, 255, 0, 255]);
        let top = solid([0, 0, 0, 0]);
        let result = composite(&[base, top]).unwrap();
        assert_eq!(result.pixels().get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }
}
