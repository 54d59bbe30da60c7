//! Tile addressing types.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Minimum supported zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum supported zoom level.
///
/// Matches the deepest level served by the common web imagery providers.
pub const MAX_ZOOM: u8 = 22;

/// Errors produced when a tile address is outside the Web Mercator grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Zoom level beyond [`MAX_ZOOM`].
    #[error("Invalid zoom level: {0} (max {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Column or row outside `[0, 2^zoom)`.
    #[error("Tile ({x}, {y}) out of range at zoom {zoom}")]
    OutOfRange { zoom: u8, x: u32, y: u32 },

    /// Empty source identifier.
    #[error("Tile key has an empty source identifier")]
    EmptySource,
}

/// Pixel density of a requested tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileVariant {
    /// Regular 256px tile.
    #[default]
    Standard,
    /// Retina tile, fetched with the `@2x` suffix where the source supports it.
    HighDensity,
}

impl TileVariant {
    /// Returns true for [`TileVariant::HighDensity`].
    pub fn is_high_density(self) -> bool {
        matches!(self, TileVariant::HighDensity)
    }

    /// Suffix appended to cache keys and URL templates.
    pub fn suffix(self) -> &'static str {
        match self {
            TileVariant::Standard => "",
            TileVariant::HighDensity => "@2x",
        }
    }
}

/// Address of one tile of one logical layer.
///
/// The key is immutable; equality and hashing cover every field, and
/// [`cache_key`](Self::cache_key) renders the stable string used as the index of
/// both cache tiers.
///
/// # Example
///
/// ```
/// use tilestream::coord::{TileKey, TileVariant};
///
/// let key = TileKey::new("osm", 3, 2, 1);
/// assert_eq!(key.cache_key(), "osm/3/2/1");
///
/// let retina = key.with_variant(TileVariant::HighDensity);
/// assert_eq!(retina.cache_key(), "osm/3/2/1@2x");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    source_id: Arc<str>,
    zoom: u8,
    x: u32,
    y: u32,
    variant: TileVariant,
}

impl TileKey {
    /// Create a standard-density key.
    pub fn new(source_id: impl Into<Arc<str>>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            source_id: source_id.into(),
            zoom,
            x,
            y,
            variant: TileVariant::Standard,
        }
    }

    /// Return a copy of this key with another variant.
    pub fn with_variant(mut self, variant: TileVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Identifier of the logical layer this tile belongs to.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Zoom level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Column (west to east).
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row (north to south).
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Pixel density variant.
    pub fn variant(&self) -> TileVariant {
        self.variant
    }

    /// Number of tiles along one axis at this key's zoom.
    pub fn grid_size(&self) -> u64 {
        1u64 << self.zoom.min(MAX_ZOOM)
    }

    /// Check that the key addresses a real tile.
    pub fn validate(&self) -> Result<(), CoordError> {
        if self.source_id.is_empty() {
            return Err(CoordError::EmptySource);
        }
        if self.zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(self.zoom));
        }
        let n = self.grid_size();
        if u64::from(self.x) >= n || u64::from(self.y) >= n {
            return Err(CoordError::OutOfRange {
                zoom: self.zoom,
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    /// Stable cache index string: `source/zoom/x/y` plus `@2x` for retina tiles.
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}/{}{}",
            self.source_id,
            self.zoom,
            self.x,
            self.y,
            self.variant.suffix()
        )
    }

    /// Bing-style quadkey for this tile.
    ///
    /// One base-4 digit per zoom level; bit `i` of x contributes 1 and bit `i`
    /// of y contributes 2. Zoom 0 yields an empty string.
    pub fn quadkey(&self) -> String {
        let mut quadkey = String::with_capacity(self.zoom as usize);
        for level in (1..=self.zoom).rev() {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            quadkey.push(digit as char);
        }
        quadkey
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Inclusive zoom range served by a source or provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomBounds {
    pub min: u8,
    pub max: u8,
}

impl ZoomBounds {
    /// Create a zoom range. The bounds are swapped if given in reverse.
    pub fn new(min: u8, max: u8) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Whether `zoom` falls inside the range.
    pub fn contains(&self, zoom: u8) -> bool {
        (self.min..=self.max).contains(&zoom)
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &ZoomBounds) -> ZoomBounds {
        ZoomBounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self {
            min: MIN_ZOOM,
            max: MAX_ZOOM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_key_standard() {
        let key = TileKey::new("mapbox.streets", 15, 5279, 12754);
        assert_eq!(key.cache_key(), "mapbox.streets/15/5279/12754");
    }

    #[test]
    fn test_cache_key_high_density() {
        let key = TileKey::new("osm", 3, 2, 1).with_variant(TileVariant::HighDensity);
        assert_eq!(key.cache_key(), "osm/3/2/1@2x");
        assert_eq!(key.to_string(), "osm/3/2/1@2x");
    }

    #[test]
    fn test_variants_are_distinct_keys() {
        let standard = TileKey::new("osm", 3, 2, 1);
        let retina = standard.clone().with_variant(TileVariant::HighDensity);
        assert_ne!(standard, retina);
        assert_ne!(standard.cache_key(), retina.cache_key());
    }

    #[test]
    fn test_validate_accepts_grid_corners() {
        assert!(TileKey::new("s", 0, 0, 0).validate().is_ok());
        assert!(TileKey::new("s", 3, 7, 7).validate().is_ok());
        assert!(TileKey::new("s", MAX_ZOOM, (1 << MAX_ZOOM) - 1, 0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = TileKey::new("s", 3, 8, 0).validate().unwrap_err();
        assert_eq!(err, CoordError::OutOfRange { zoom: 3, x: 8, y: 0 });

        let err = TileKey::new("s", 0, 0, 1).validate().unwrap_err();
        assert!(matches!(err, CoordError::OutOfRange { .. }));
    }

    #[test]
    fn test_validate_rejects_zoom_and_empty_source() {
        assert_eq!(
            TileKey::new("s", 23, 0, 0).validate(),
            Err(CoordError::InvalidZoom(23))
        );
        assert_eq!(
            TileKey::new("", 1, 0, 0).validate(),
            Err(CoordError::EmptySource)
        );
    }

    #[test]
    fn test_quadkey_known_values() {
        // Examples from the Bing Maps tile system documentation
        assert_eq!(TileKey::new("b", 3, 3, 5).quadkey(), "213");
        assert_eq!(TileKey::new("b", 1, 1, 0).quadkey(), "1");
        assert_eq!(TileKey::new("b", 1, 0, 1).quadkey(), "2");
        assert_eq!(TileKey::new("b", 0, 0, 0).quadkey(), "");
    }

    #[test]
    fn test_zoom_bounds() {
        let bounds = ZoomBounds::new(5, 2);
        assert_eq!(bounds, ZoomBounds { min: 2, max: 5 });
        assert!(bounds.contains(2));
        assert!(bounds.contains(5));
        assert!(!bounds.contains(6));

        let union = bounds.union(&ZoomBounds::new(4, 9));
        assert_eq!(union, ZoomBounds::new(2, 9));
    }

    proptest! {
        #[test]
        fn test_valid_keys_have_distinct_strings(
            zoom in 1u8..=MAX_ZOOM,
            a in any::<u32>(),
            b in any::<u32>(),
        ) {
            let n = 1u32 << zoom;
            let (x, y) = (a % n, b % n);
            let key = TileKey::new("layer", zoom, x, y);
            prop_assert!(key.validate().is_ok());
            prop_assert_eq!(key.quadkey().len(), zoom as usize);

            let hd = key.clone().with_variant(TileVariant::HighDensity);
            prop_assert_ne!(key.cache_key(), hd.cache_key());
            prop_assert_eq!(
                key.cache_key(),
                format!("layer/{}/{}/{}", zoom, x, y)
            );
        }
    }
}
