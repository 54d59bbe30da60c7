//! In-memory tier with strict LRU eviction.
//!
//! Entries are decoded [`TileImage`]s weighted by their raw RGBA size. The
//! index is an `LruCache` behind a short `parking_lot::Mutex`; lookups promote
//! the entry, inserts evict from the least-recently-used end until the tier
//! fits its byte budget again.

use lru::LruCache;
use parking_lot::Mutex;

use crate::tile::{Provenance, TileImage};

/// Result of inserting into the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryInsert {
    /// Stored; the count of entries evicted to make room.
    Stored { evicted: usize },
    /// Not stored because the entry alone exceeds the budget.
    TooLarge,
}

struct MemoryIndex {
    entries: LruCache<String, TileImage>,
    size_bytes: u64,
}

/// Byte-bounded LRU map from cache key to decoded tile.
pub struct MemoryTier {
    index: Mutex<MemoryIndex>,
    max_bytes: u64,
}

impl MemoryTier {
    /// Create an empty tier holding at most `max_bytes` of decoded pixels.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            index: Mutex::new(MemoryIndex {
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Look up a tile and mark it most recently used.
    ///
    /// The returned image shares its pixels with the cached entry and carries
    /// [`Provenance::MemoryCache`].
    pub fn get(&self, key: &str) -> Option<TileImage> {
        let mut index = self.index.lock();
        index
            .entries
            .get(key)
            .map(|tile| tile.with_provenance(Provenance::MemoryCache))
    }

    /// Presence check without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.lock().entries.contains(key)
    }

    /// Insert or replace an entry, evicting least-recently-used entries as needed.
    ///
    /// A tile heavier than the whole budget is not stored, and any older entry
    /// under the same key is dropped so it cannot be served in its place.
    pub fn insert(&self, key: String, tile: TileImage) -> MemoryInsert {
        let weight = tile.weight();
        let mut index = self.index.lock();
        if weight > self.max_bytes {
            if let Some(stale) = index.entries.pop(&key) {
                index.size_bytes -= stale.weight();
            }
            return MemoryInsert::TooLarge;
        }

        if let Some(previous) = index.entries.put(key, tile) {
            index.size_bytes -= previous.weight();
        }
        index.size_bytes += weight;

        let mut evicted = 0;
        while index.size_bytes > self.max_bytes {
            match index.entries.pop_lru() {
                Some((_, old)) => {
                    index.size_bytes -= old.weight();
                    evicted += 1;
                }
                None => break,
            }
        }
        MemoryInsert::Stored { evicted }
    }

    /// Remove an entry. Returns true when it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut index = self.index.lock();
        match index.entries.pop(key) {
            Some(old) => {
                index.size_bytes -= old.weight();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut index = self.index.lock();
        index.entries.clear();
        index.size_bytes = 0;
    }

    /// Current sum of entry weights.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().size_bytes
    }

    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use proptest::prelude::*;

    /// A tile weighing `side * side * 4` bytes.
    fn tile(side: u32) -> TileImage {
        TileImage::new(
            RgbaImage::from_pixel(side, side, Rgba([9, 9, 9, 255])),
            Provenance::Fetched,
        )
    }

    #[test]
    fn test_get_returns_memory_provenance() {
        let tier = MemoryTier::new(1024);
        let original = tile(2);
        tier.insert("a".into(), original.clone());

        let hit = tier.get("a").unwrap();
        assert_eq!(hit.provenance(), Provenance::MemoryCache);
        assert!(hit.shares_pixels(&original));
        assert!(tier.get("b").is_none());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        // Each tile is 16 bytes; room for three
        let tier = MemoryTier::new(48);
        tier.insert("a".into(), tile(2));
        tier.insert("b".into(), tile(2));
        tier.insert("c".into(), tile(2));

        // Touch "a" so "b" becomes the oldest
        assert!(tier.get("a").is_some());

        let outcome = tier.insert("d".into(), tile(2));
        assert_eq!(outcome, MemoryInsert::Stored { evicted: 1 });
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c"));
        assert!(tier.contains("d"));
        assert_eq!(tier.size_bytes(), 48);
    }

    #[test]
    fn test_contains_does_not_promote() {
        let tier = MemoryTier::new(32);
        tier.insert("a".into(), tile(2));
        tier.insert("b".into(), tile(2));
        assert!(tier.contains("a"));

        tier.insert("c".into(), tile(2));
        assert!(!tier.contains("a"));
    }

    #[test]
    fn test_oversized_entry_not_stored() {
        let tier = MemoryTier::new(10);
        assert_eq!(tier.insert("big".into(), tile(2)), MemoryInsert::TooLarge);
        assert!(tier.is_empty());
        assert_eq!(tier.size_bytes(), 0);
    }

    #[test]
    fn test_oversized_replacement_drops_stale_entry() {
        let tier = MemoryTier::new(64);
        tier.insert("a".into(), tile(2));
        tier.insert("b".into(), tile(2));

        assert_eq!(tier.insert("a".into(), tile(8)), MemoryInsert::TooLarge);
        assert!(tier.get("a").is_none());
        assert!(tier.contains("b"));
        assert_eq!(tier.size_bytes(), 16);
    }

    #[test]
    fn test_replace_updates_size() {
        let tier = MemoryTier::new(1024);
        tier.insert("a".into(), tile(2));
        tier.insert("a".into(), tile(4));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.size_bytes(), 64);
    }

    #[test]
    fn test_remove_and_clear() {
        let tier = MemoryTier::new(1024);
        tier.insert("a".into(), tile(2));
        tier.insert("b".into(), tile(2));

        assert!(tier.remove("a"));
        assert!(!tier.remove("a"));
        assert_eq!(tier.size_bytes(), 16);

        tier.clear();
        assert!(tier.is_empty());
        assert_eq!(tier.size_bytes(), 0);
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_budget(
            budget in 16u64..512,
            sides in proptest::collection::vec(1u32..8, 1..64),
        ) {
            let tier = MemoryTier::new(budget);
            for (i, side) in sides.iter().enumerate() {
                tier.insert(format!("k{}", i % 12), tile(*side));
                prop_assert!(tier.size_bytes() <= budget);
            }
        }
    }
}
