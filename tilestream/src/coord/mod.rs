//! Tile addressing.
//!
//! Provides the [`TileKey`] value type used as the index of every cache tier and
//! the unit of work of the loading pipeline, plus small helpers for ordering
//! requests by screen priority.

mod types;

pub use types::{CoordError, TileKey, TileVariant, ZoomBounds, MAX_ZOOM, MIN_ZOOM};

/// Sort keys so that tiles nearest the viewport center come first.
///
/// The viewport layer hands over the visible keys together with the center tile;
/// requesting center tiles first gets them into the provider queues ahead of the
/// edges. The sort is stable, so keys at equal distance keep their given order.
///
/// # Example
///
/// ```
/// use tilestream::coord::{sort_center_first, TileKey};
///
/// let mut keys = vec![
///     TileKey::new("osm", 4, 0, 0),
///     TileKey::new("osm", 4, 5, 5),
///     TileKey::new("osm", 4, 4, 5),
/// ];
/// sort_center_first(&mut keys, 5, 5);
/// assert_eq!(keys[0], TileKey::new("osm", 4, 5, 5));
/// ```
pub fn sort_center_first(keys: &mut [TileKey], center_x: u32, center_y: u32) {
    keys.sort_by_key(|key| {
        let dx = i64::from(key.x()) - i64::from(center_x);
        let dy = i64::from(key.y()) - i64::from(center_y);
        dx * dx + dy * dy
    });
}
