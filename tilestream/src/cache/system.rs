//! Two-tier tile cache.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheLocation};
use super::disk::DiskTier;
use super::error::CacheError;
use super::memory::{MemoryInsert, MemoryTier};
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::coord::TileKey;
use crate::tile::TileImage;

/// Memory + disk cache of decoded tiles.
///
/// Both tiers are byte-bounded strict LRU and evict independently; a disk hit
/// is promoted into memory. Lookups never touch the network.
///
/// # Locking
///
/// A cache-wide `RwLock` guards the disk tier handle. Lookups and inserts hold
/// it shared; [`clear`](Self::clear) and disk toggling hold it exclusively, so
/// a concurrent reader observes either the state before or after them. Each
/// tier additionally serializes its own index behind a short mutex. No lock is
/// ever held across network I/O.
///
/// # Example
///
/// ```
/// use tilestream::cache::{CacheConfig, TileCache};
/// use tilestream::coord::TileKey;
///
/// let cache = TileCache::new(CacheConfig::memory_only(1024 * 1024));
/// assert!(cache.get(&TileKey::new("osm", 3, 2, 1)).is_none());
/// ```
pub struct TileCache {
    memory: MemoryTier,
    disk: RwLock<Option<Arc<DiskTier>>>,
    preferred: Option<PathBuf>,
    directory: OnceLock<PathBuf>,
    disk_size: u64,
    stats: CacheStats,
}

impl TileCache {
    /// Build a cache from configuration.
    ///
    /// The disk directory is resolved (and created) the first time the disk
    /// tier is enabled, and kept for the life of the cache. A memory-only cache
    /// never touches the filesystem. If the disk tier cannot be opened the
    /// cache starts memory-only and logs a warning.
    pub fn new(config: CacheConfig) -> Self {
        let cache = Self {
            memory: MemoryTier::new(config.memory_size),
            disk: RwLock::new(None),
            preferred: config.directory,
            directory: OnceLock::new(),
            disk_size: config.disk_size,
            stats: CacheStats::new(),
        };

        if config.disk_enabled {
            let opened = open_disk(cache.resolve_directory(), cache.disk_size);
            *cache.disk.write() = opened;
        }

        info!(
            memory_bytes = config.memory_size,
            disk_bytes = config.disk_size,
            disk_enabled = cache.is_disk_cache_enabled(),
            dir = ?cache.directory(),
            "Tile cache created"
        );
        cache
    }

    // =========================================================================
    // Combined tiers
    // =========================================================================

    /// Look up a tile, memory first, then disk.
    ///
    /// A disk hit is decoded, promoted into memory, and returned with
    /// [`Provenance::DiskCache`](crate::tile::Provenance::DiskCache).
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        let cache_key = key.cache_key();
        let disk = self.disk.read();

        if let Some(hit) = self.memory.get(&cache_key) {
            self.stats.record_memory_hit();
            return Some(hit);
        }
        self.stats.record_memory_miss();

        let tier = disk.as_ref()?;
        match tier.get(&cache_key) {
            Some(hit) => {
                self.stats.record_disk_hit();
                self.insert_memory(cache_key, hit.clone());
                Some(hit)
            }
            None => {
                self.stats.record_disk_miss();
                None
            }
        }
    }

    /// Store a tile.
    ///
    /// Always inserts into memory. Writes to disk only when the disk tier is
    /// enabled and the key is not already persisted. A disk write failure
    /// disables the disk tier for the rest of the session; the memory insert
    /// still stands.
    ///
    /// When the tile does not fit the memory tier, an older disk copy of the
    /// key is replaced so a later lookup cannot return it.
    pub fn put(&self, key: &TileKey, tile: &TileImage) {
        let cache_key = key.cache_key();

        let failed = {
            let disk = self.disk.read();
            let in_memory = self.insert_memory(cache_key.clone(), tile.clone());

            match disk.as_ref() {
                Some(tier) if !in_memory && tier.contains(&cache_key) => {
                    tier.remove(&cache_key);
                    self.write_disk(key, &cache_key, tier, tile)
                }
                Some(tier) if !tier.contains(&cache_key) => {
                    self.write_disk(key, &cache_key, tier, tile)
                }
                _ => None,
            }
        };

        if let Some((tier, error)) = failed {
            self.stats.record_disk_write_failure();
            self.disable_failed_disk(&tier, &error);
        }
    }

    fn write_disk(
        &self,
        key: &TileKey,
        cache_key: &str,
        tier: &Arc<DiskTier>,
        tile: &TileImage,
    ) -> Option<(Arc<DiskTier>, CacheError)> {
        match tier.put(cache_key, tile) {
            Ok(evicted) => {
                self.stats.record_disk_write(evicted);
                None
            }
            Err(CacheError::TooLarge { size, max }) => {
                debug!(key = %key, size, max, "Tile too large for disk tier");
                None
            }
            Err(e) => Some((Arc::clone(tier), e)),
        }
    }

    /// Remove a tile from both tiers.
    pub fn remove(&self, key: &TileKey) {
        let cache_key = key.cache_key();
        let disk = self.disk.read();
        self.memory.remove(&cache_key);
        if let Some(tier) = disk.as_ref() {
            tier.remove(&cache_key);
        }
    }

    /// Empty both tiers atomically with respect to concurrent readers.
    pub fn clear(&self) -> Result<(), CacheError> {
        let disk = self.disk.write();
        self.memory.clear();
        let result = match disk.as_ref() {
            Some(tier) => tier.clear(),
            None => Ok(()),
        };
        info!("Tile cache cleared");
        result
    }

    /// True when either tier holds the tile.
    pub fn contains(&self, key: &TileKey) -> bool {
        let cache_key = key.cache_key();
        let disk = self.disk.read();
        self.memory.contains(&cache_key)
            || disk.as_ref().is_some_and(|tier| tier.contains(&cache_key))
    }

    // =========================================================================
    // Disk tier control
    // =========================================================================

    /// Enable or disable the disk tier.
    ///
    /// Enabling opens a fresh handle on the cache directory (re-indexing any
    /// files already there); disabling drops the handle but keeps the files.
    /// The memory tier is untouched. Calling with the current state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the open error when enabling fails; the tier stays disabled.
    pub fn set_disk_cache_enabled(&self, enabled: bool) -> Result<(), CacheError> {
        let mut disk = self.disk.write();
        match (enabled, disk.is_some()) {
            (true, false) => {
                let directory = self.resolve_directory();
                let tier = DiskTier::open(directory, self.disk_size)?;
                *disk = Some(Arc::new(tier));
                info!(dir = %directory.display(), "Disk cache enabled");
            }
            (false, true) => {
                *disk = None;
                info!("Disk cache disabled");
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_disk_cache_enabled(&self) -> bool {
        self.disk.read().is_some()
    }

    // =========================================================================
    // Tier-specific access
    // =========================================================================

    /// Memory-only lookup; promotes the entry.
    pub fn get_from_memory(&self, key: &TileKey) -> Option<TileImage> {
        let _disk = self.disk.read();
        self.memory.get(&key.cache_key())
    }

    /// Disk-only lookup; does not promote into memory.
    pub fn get_from_disk(&self, key: &TileKey) -> Option<TileImage> {
        let disk = self.disk.read();
        disk.as_ref()?.get(&key.cache_key())
    }

    pub fn contains_in_memory(&self, key: &TileKey) -> bool {
        let _disk = self.disk.read();
        self.memory.contains(&key.cache_key())
    }

    pub fn contains_on_disk(&self, key: &TileKey) -> bool {
        let disk = self.disk.read();
        disk.as_ref()
            .is_some_and(|tier| tier.contains(&key.cache_key()))
    }

    /// Drop a tile from memory only, e.g. to force a repaint from disk.
    pub fn remove_from_memory(&self, key: &TileKey) -> bool {
        let _disk = self.disk.read();
        self.memory.remove(&key.cache_key())
    }

    /// Empty the memory tier.
    pub fn purge_memory(&self) {
        let _disk = self.disk.write();
        self.memory.clear();
        debug!("Memory tier purged");
    }

    /// Empty the disk tier. A disabled disk tier is left alone.
    pub fn purge_disk(&self) -> Result<(), CacheError> {
        let disk = self.disk.write();
        match disk.as_ref() {
            Some(tier) => {
                tier.clear()?;
                debug!("Disk tier purged");
                Ok(())
            }
            None => Ok(()),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn memory_size_bytes(&self) -> u64 {
        self.memory.size_bytes()
    }

    pub fn memory_entries(&self) -> usize {
        self.memory.len()
    }

    /// Bytes on disk, 0 when the disk tier is disabled.
    pub fn disk_size_bytes(&self) -> u64 {
        self.disk.read().as_ref().map_or(0, |tier| tier.size_bytes())
    }

    pub fn disk_entries(&self) -> usize {
        self.disk.read().as_ref().map_or(0, |tier| tier.len())
    }

    /// Directory of the disk tier, or `None` while it has never been enabled.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.get().map(PathBuf::as_path)
    }

    fn resolve_directory(&self) -> &Path {
        self.directory
            .get_or_init(|| CacheLocation::resolve(self.preferred.as_deref()).into_path())
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns false when the tile was too large for the memory tier.
    fn insert_memory(&self, cache_key: String, tile: TileImage) -> bool {
        match self.memory.insert(cache_key, tile) {
            MemoryInsert::Stored { evicted } => {
                if evicted > 0 {
                    self.stats.record_memory_evictions(evicted);
                }
                true
            }
            MemoryInsert::TooLarge => {
                debug!(max = self.memory.max_bytes(), "Tile too large for memory tier");
                false
            }
        }
    }

    fn disable_failed_disk(&self, failed: &Arc<DiskTier>, error: &CacheError) {
        let mut disk = self.disk.write();
        let is_current = disk
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, failed));
        if is_current {
            *disk = None;
            warn!(
                dir = %failed.directory().display(),
                error = %error,
                "Disk cache write failed, disk tier disabled for this session"
            );
        }
    }
}

fn open_disk(directory: &Path, max_bytes: u64) -> Option<Arc<DiskTier>> {
    match DiskTier::open(directory, max_bytes) {
        Ok(tier) => Some(Arc::new(tier)),
        Err(e) => {
            warn!(dir = %directory.display(), error = %e, "Disk cache unavailable, using memory only");
            None
        }
    }
}
