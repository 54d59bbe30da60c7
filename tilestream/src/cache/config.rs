//! Cache configuration and directory selection.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Default memory tier budget (64 MB).
pub const DEFAULT_MEMORY_SIZE: u64 = 64 * 1024 * 1024;

/// Default disk tier budget (100 MB).
pub const DEFAULT_DISK_SIZE: u64 = 100 * 1024 * 1024;

/// Directory name used under the platform cache root.
const CACHE_SUBDIR: &str = "tilestream";

/// Settings for a [`TileCache`](super::TileCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Preferred cache root. `None` goes straight to the platform default.
    pub directory: Option<PathBuf>,
    /// Memory tier budget in bytes of decoded RGBA.
    pub memory_size: u64,
    /// Disk tier budget in bytes of stored PNG.
    pub disk_size: u64,
    /// Whether the disk tier starts enabled.
    pub disk_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            memory_size: DEFAULT_MEMORY_SIZE,
            disk_size: DEFAULT_DISK_SIZE,
            disk_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Memory-only configuration, mostly useful for tests and one-shot tools.
    pub fn memory_only(memory_size: u64) -> Self {
        Self {
            directory: None,
            memory_size,
            disk_size: 0,
            disk_enabled: false,
        }
    }

    /// Set the preferred directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// The directory chosen for the disk tier and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    /// The configured directory (external storage).
    Preferred(PathBuf),
    /// The platform cache directory, e.g. `~/.cache/tilestream/tiles`.
    Platform(PathBuf),
    /// Last resort under the system temp directory.
    Temporary(PathBuf),
}

impl CacheLocation {
    /// Pick the disk tier root.
    ///
    /// The preferred directory wins when it exists or can be created; otherwise
    /// the platform cache directory, then the temp directory. The decision is
    /// made once, when the cache is built.
    pub fn resolve(preferred: Option<&Path>) -> CacheLocation {
        if let Some(dir) = preferred {
            if ensure_dir(dir) {
                return CacheLocation::Preferred(dir.to_path_buf());
            }
            warn!(dir = %dir.display(), "Preferred cache directory unusable, falling back");
        }

        if let Some(base) = dirs::cache_dir() {
            let dir = base.join(CACHE_SUBDIR).join("tiles");
            if ensure_dir(&dir) {
                return CacheLocation::Platform(dir);
            }
        }

        CacheLocation::Temporary(std::env::temp_dir().join(CACHE_SUBDIR).join("tiles"))
    }

    pub fn path(&self) -> &Path {
        match self {
            CacheLocation::Preferred(p) | CacheLocation::Platform(p) | CacheLocation::Temporary(p) => {
                p
            }
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            CacheLocation::Preferred(p) | CacheLocation::Platform(p) | CacheLocation::Temporary(p) => {
                p
            }
        }
    }
}

fn ensure_dir(dir: &Path) -> bool {
    if dir.is_dir() {
        return true;
    }
    match fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Cannot create cache directory");
            false
        }
    }
}
