//! Persistent tier: one PNG file per tile.
//!
//! # Layout
//!
//! ```text
//! {dir}/
//! ├── 3f2a...e1.png      sha256(cache_key) in hex
//! └── 91bc...07.png
//! ```
//!
//! Files are written to a temporary name and renamed into place, so a reader
//! never observes a partial entry. The LRU index lives in memory and is
//! rebuilt on open from the files present, oldest modification time first.
//! PNG is lossless, so a stored tile decodes to exactly the pixels that were
//! put; a file that no longer decodes is deleted and reported as a miss.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::CacheError;
use crate::tile::{self, Provenance, TileImage};

const ENTRY_EXTENSION: &str = "png";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

struct DiskIndex {
    /// Entry file stem -> file size in bytes.
    entries: LruCache<String, u64>,
    size_bytes: u64,
}

/// Byte-bounded LRU store of PNG files under one directory.
pub struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<DiskIndex>,
}

impl DiskTier {
    /// Open (or create) a disk tier rooted at `dir`.
    ///
    /// Existing entries are indexed by modification time; leftover temporary
    /// files are removed, and the tier is trimmed to `max_bytes` if the budget
    /// shrank since the last run.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut found: Vec<(SystemTime, String, u64)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext == TEMP_EXTENSION {
                let _ = fs::remove_file(&path);
                continue;
            }
            if ext != ENTRY_EXTENSION {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, stem.to_string(), metadata.len()));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut index = DiskIndex {
            entries: LruCache::unbounded(),
            size_bytes: 0,
        };
        for (_, stem, size) in found {
            index.size_bytes += size;
            index.entries.put(stem, size);
        }

        let tier = Self {
            dir,
            max_bytes,
            index: Mutex::new(index),
        };

        let trimmed = {
            let mut index = tier.index.lock();
            tier.evict_to_budget(&mut index)
        };

        let (entries, size) = {
            let index = tier.index.lock();
            (index.entries.len(), index.size_bytes)
        };
        info!(
            dir = %tier.dir.display(),
            entries,
            size_bytes = size,
            max_bytes,
            trimmed,
            "Disk cache opened"
        );

        Ok(tier)
    }

    /// File stem for a cache key.
    pub fn entry_name(cache_key: &str) -> String {
        let digest = Sha256::digest(cache_key.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn entry_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, ENTRY_EXTENSION))
    }

    /// Read and decode a stored tile, marking it most recently used.
    ///
    /// Missing or undecodable files are dropped from the index and reported
    /// as a miss.
    pub fn get(&self, cache_key: &str) -> Option<TileImage> {
        let stem = Self::entry_name(cache_key);
        {
            let mut index = self.index.lock();
            index.entries.get(&stem)?;
        }

        let path = self.entry_path(&stem);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to read cached tile");
                }
                self.forget(&stem, false);
                return None;
            }
        };

        match tile::decode(&bytes) {
            Ok(decoded) => {
                touch(&path);
                Some(decoded.with_provenance(Provenance::DiskCache))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding undecodable cache entry");
                self.forget(&stem, true);
                None
            }
        }
    }

    /// Presence check without touching recency.
    pub fn contains(&self, cache_key: &str) -> bool {
        let stem = Self::entry_name(cache_key);
        self.index.lock().entries.contains(&stem)
    }

    /// Encode and store a tile, evicting old entries to stay within budget.
    ///
    /// # Returns
    ///
    /// The number of entries evicted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if the tile cannot be encoded,
    /// [`CacheError::TooLarge`] if the encoded tile exceeds the whole budget,
    /// or [`CacheError::Io`] if the file cannot be written.
    pub fn put(&self, cache_key: &str, tile: &TileImage) -> Result<usize, CacheError> {
        let bytes = tile::encode_png(tile)?;
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(CacheError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let stem = Self::entry_name(cache_key);
        let final_path = self.entry_path(&stem);
        let temp_path = self.dir.join(format!(
            "{}.{}.{}.{}",
            stem,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));

        if let Err(e) = write_file(&temp_path, &bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        let mut index = self.index.lock();
        if let Some(previous) = index.entries.put(stem, size) {
            index.size_bytes -= previous;
        }
        index.size_bytes += size;
        let evicted = self.evict_to_budget(&mut index);

        debug!(key = cache_key, size_bytes = size, evicted, "Tile written to disk cache");
        Ok(evicted)
    }

    /// Delete one entry. Returns true when it was indexed.
    pub fn remove(&self, cache_key: &str) -> bool {
        let stem = Self::entry_name(cache_key);
        self.forget(&stem, true)
    }

    /// Delete every indexed entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut index = self.index.lock();
        let mut first_error = None;
        while let Some((stem, _)) = index.entries.pop_lru() {
            if let Err(e) = fs::remove_file(self.entry_path(&stem)) {
                if e.kind() != ErrorKind::NotFound && first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        index.size_bytes = 0;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

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

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn forget(&self, stem: &str, delete_file: bool) -> bool {
        let mut index = self.index.lock();
        let Some(size) = index.entries.pop(stem) else {
            return false;
        };
        index.size_bytes -= size;
        if delete_file {
            let _ = fs::remove_file(self.entry_path(stem));
        }
        true
    }

    fn evict_to_budget(&self, index: &mut DiskIndex) -> usize {
        let mut evicted = 0;
        while index.size_bytes > self.max_bytes {
            let Some((stem, size)) = index.entries.pop_lru() else {
                break;
            };
            index.size_bytes -= size;
            if let Err(e) = fs::remove_file(self.entry_path(&stem)) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(entry = %stem, error = %e, "Failed to delete evicted cache file");
                }
            }
            evicted += 1;
        }
        evicted
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Refresh the modification time so recency survives a restart.
fn touch(path: &Path) {
    if let Ok(file) = fs::File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn tile(color: [u8; 4]) -> TileImage {
        TileImage::new(RgbaImage::from_pixel(8, 8, Rgba(color)), Provenance::Fetched)
    }

    fn encoded_size(tile: &TileImage) -> u64 {
        tile::encode_png(tile).unwrap().len() as u64
    }

    #[test]
    fn test_entry_name_is_hex_sha256() {
        let name = DiskTier::entry_name("osm/3/2/1");
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, DiskTier::entry_name("osm/3/2/1@2x"));
    }

    #[test]
    fn test_put_then_get() {
        let temp = TempDir::new().unwrap();
        let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
        let original = tile([1, 2, 3, 255]);

        tier.put("osm/1/0/0", &original).unwrap();
        assert!(tier.contains("osm/1/0/0"));

        let loaded = tier.get("osm/1/0/0").unwrap();
        assert_eq!(loaded.provenance(), Provenance::DiskCache);
        assert_eq!(loaded.as_raw(), original.as_raw());
        assert!(tier.get("osm/1/1/0").is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
        tier.put("k", &tile([0, 0, 0, 255])).unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".png"));
    }

    #[test]
    fn test_eviction_respects_budget() {
        let temp = TempDir::new().unwrap();
        let sample = tile([5, 5, 5, 255]);
        let size = encoded_size(&sample);
        let tier = DiskTier::open(temp.path(), size * 2).unwrap();

        tier.put("a", &sample).unwrap();
        tier.put("b", &sample).unwrap();
        assert!(tier.get("a").is_some());
        let evicted = tier.put("c", &sample).unwrap();

        assert_eq!(evicted, 1);
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c"));
        assert!(tier.size_bytes() <= size * 2);
        assert!(!temp
            .path()
            .join(format!("{}.png", DiskTier::entry_name("b")))
            .exists());
    }

    #[test]
    fn test_too_large_rejected() {
        let temp = TempDir::new().unwrap();
        let tier = DiskTier::open(temp.path(), 8).unwrap();
        let result = tier.put("k", &tile([1, 1, 1, 255]));
        assert!(matches!(result, Err(CacheError::TooLarge { .. })));
        assert!(tier.is_empty());
    }

    #[test]
    fn test_reopen_rebuilds_index() {
        let temp = TempDir::new().unwrap();
        {
            let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
            tier.put("a", &tile([1, 0, 0, 255])).unwrap();
            tier.put("b", &tile([0, 1, 0, 255])).unwrap();
        }
        fs::write(temp.path().join("stale.tmp"), b"partial").unwrap();

        let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
        assert_eq!(tier.len(), 2);
        assert!(tier.get("b").is_some());
        assert!(!temp.path().join("stale.tmp").exists());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
        tier.put("k", &tile([1, 1, 1, 255])).unwrap();

        let path = temp
            .path()
            .join(format!("{}.png", DiskTier::entry_name("k")));
        fs::write(&path, b"garbage").unwrap();

        assert!(tier.get("k").is_none());
        assert!(!tier.contains("k"));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let tier = DiskTier::open(temp.path(), 1024 * 1024).unwrap();
        tier.put("a", &tile([1, 1, 1, 255])).unwrap();
        tier.put("b", &tile([2, 2, 2, 255])).unwrap();

        assert!(tier.remove("a"));
        assert!(!tier.remove("a"));
        assert_eq!(tier.len(), 1);

        tier.clear().unwrap();
        assert!(tier.is_empty());
        assert_eq!(tier.size_bytes(), 0);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
