//! Local tile archives.
//!
//! An [`ArchiveSource`] searches an ordered list of archives; the first
//! archive that holds a tile wins. Archives report their own zoom range
//! through [`TileArchive::zoom_bounds`], and the source takes its bounds from
//! the first archive that reports one.

use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use super::types::{FetchLocation, SourceMetadata, TileSource};
use crate::coord::{TileKey, ZoomBounds, MAX_ZOOM};
use crate::provider::FetchError;

/// Read access to a store of encoded tiles.
pub trait TileArchive: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Encoded bytes of a tile, `Ok(None)` when the archive does not hold it.
    ///
    /// # Errors
    ///
    /// [`FetchError::Archive`] when the archive exists but cannot be read.
    fn read(&self, key: &TileKey) -> Result<Option<Vec<u8>>, FetchError>;

    /// Zoom levels present in the archive, if known.
    fn zoom_bounds(&self) -> Option<ZoomBounds> {
        None
    }
}

// =============================================================================
// Directory archive
// =============================================================================

/// Tiles stored as `{root}/{z}/{x}/{y}.{ext}`.
///
/// High-density keys look for `{y}@2x.{ext}` first and fall back to the
/// standard file.
pub struct DirectoryArchive {
    name: String,
    root: PathBuf,
    extension: String,
    zoom_bounds: Option<ZoomBounds>,
}

impl DirectoryArchive {
    /// Open an archive rooted at `root`.
    ///
    /// Numeric subdirectories of `root` are taken as zoom levels to compute
    /// the archive's zoom range.
    pub fn open(root: impl Into<PathBuf>, extension: &str) -> std::io::Result<Self> {
        let root = root.into();
        let mut levels = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(level) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|z| *z <= MAX_ZOOM)
            {
                levels.push(level);
            }
        }

        let zoom_bounds = match (levels.iter().min(), levels.iter().max()) {
            (Some(&min), Some(&max)) => Some(ZoomBounds::new(min, max)),
            _ => None,
        };
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        debug!(archive = %name, root = %root.display(), ?zoom_bounds, "Opened directory archive");
        Ok(Self {
            name,
            root,
            extension: extension.trim_start_matches('.').to_string(),
            zoom_bounds,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, key: &TileKey, suffix: &str) -> PathBuf {
        self.root
            .join(key.zoom().to_string())
            .join(key.x().to_string())
            .join(format!("{}{}.{}", key.y(), suffix, self.extension))
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, FetchError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::Archive(format!("{}: {}", path.display(), e))),
        }
    }
}

impl TileArchive for DirectoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &TileKey) -> Result<Option<Vec<u8>>, FetchError> {
        if key.variant().is_high_density() {
            if let Some(bytes) = self.read_file(&self.tile_path(key, "@2x"))? {
                return Ok(Some(bytes));
            }
        }
        self.read_file(&self.tile_path(key, ""))
    }

    fn zoom_bounds(&self) -> Option<ZoomBounds> {
        self.zoom_bounds
    }
}

// =============================================================================
// MBTiles archive
// =============================================================================

/// File extension picked up by [`ArchiveSource::discover`].
pub const MBTILES_EXTENSION: &str = "mbtiles";

/// A single-file SQLite tile store in the MBTiles layout.
///
/// Tiles live in the `tiles` table with TMS row numbering (row 0 at the
/// south edge), so `y` is flipped on lookup. The zoom range comes from the
/// `minzoom`/`maxzoom` rows of the `metadata` table, or from the tiles
/// themselves when those rows are missing. MBTiles has no high-density
/// variant; `@2x` keys read the standard tile.
pub struct MbTilesArchive {
    name: String,
    path: PathBuf,
    conn: Mutex<Connection>,
    zoom_bounds: Option<ZoomBounds>,
}

impl MbTilesArchive {
    /// Open an `.mbtiles` file read-only.
    pub fn open(path: impl Into<PathBuf>) -> rusqlite::Result<Self> {
        let path = path.into();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let zoom_bounds = read_zoom_bounds(&conn)?;
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(archive = %name, path = %path.display(), ?zoom_bounds, "Opened MBTiles archive");
        Ok(Self {
            name,
            path,
            conn: Mutex::new(conn),
            zoom_bounds,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_zoom_bounds(conn: &Connection) -> rusqlite::Result<Option<ZoomBounds>> {
    let metadata_zoom = |field: &str| -> rusqlite::Result<Option<u8>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = ?1",
                params![field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|z| *z <= MAX_ZOOM))
    };

    if let (Some(min), Some(max)) = (metadata_zoom("minzoom")?, metadata_zoom("maxzoom")?) {
        if min <= max {
            return Ok(Some(ZoomBounds::new(min, max)));
        }
    }

    let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT MIN(zoom_level), MAX(zoom_level) FROM tiles",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let level = |z: Option<i64>| z.and_then(|z| u8::try_from(z).ok()).filter(|z| *z <= MAX_ZOOM);
    Ok(match (level(min), level(max)) {
        (Some(min), Some(max)) => Some(ZoomBounds::new(min, max)),
        _ => None,
    })
}

impl TileArchive for MbTilesArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &TileKey) -> Result<Option<Vec<u8>>, FetchError> {
        let zoom = key.zoom();
        let row = (1i64 << zoom) - 1 - i64::from(key.y());
        self.conn
            .lock()
            .query_row(
                "SELECT tile_data FROM tiles \
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![zoom, key.x(), row],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(|e| FetchError::Archive(format!("{}: {}", self.path.display(), e)))
    }

    fn zoom_bounds(&self) -> Option<ZoomBounds> {
        self.zoom_bounds
    }
}

// =============================================================================
// In-memory archive
// =============================================================================

/// Archive held in memory, keyed by (zoom, x, y).
///
/// Useful for bundled fallback tiles and for tests.
pub struct MemoryArchive {
    name: String,
    tiles: RwLock<HashMap<(u8, u32, u32), Vec<u8>>>,
    reads: AtomicUsize,
}

impl MemoryArchive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiles: RwLock::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    /// Add or replace the encoded bytes of one tile.
    pub fn insert(&self, zoom: u8, x: u32, y: u32, bytes: Vec<u8>) {
        self.tiles.write().insert((zoom, x, y), bytes);
    }

    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `read` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl TileArchive for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &TileKey) -> Result<Option<Vec<u8>>, FetchError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tiles
            .read()
            .get(&(key.zoom(), key.x(), key.y()))
            .cloned())
    }

    fn zoom_bounds(&self) -> Option<ZoomBounds> {
        let tiles = self.tiles.read();
        let min = tiles.keys().map(|k| k.0).min()?;
        let max = tiles.keys().map(|k| k.0).max()?;
        Some(ZoomBounds::new(min, max))
    }
}

// =============================================================================
// Archive source
// =============================================================================

/// Ordered archives searched as one; first hit wins.
struct ArchiveSet {
    name: String,
    archives: RwLock<Vec<Arc<dyn TileArchive>>>,
}

impl TileArchive for ArchiveSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &TileKey) -> Result<Option<Vec<u8>>, FetchError> {
        let archives = self.archives.read().clone();
        let mut last_error = None;
        for archive in archives {
            match archive.read(key) {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn zoom_bounds(&self) -> Option<ZoomBounds> {
        self.archives
            .read()
            .iter()
            .find_map(|archive| archive.zoom_bounds())
    }
}

/// A layer served from local archives.
pub struct ArchiveSource {
    id: String,
    set: Arc<ArchiveSet>,
    discovery: Option<(PathBuf, String)>,
}

impl ArchiveSource {
    /// Source over explicit archives, searched in the given order.
    pub fn new(id: impl Into<String>, archives: Vec<Arc<dyn TileArchive>>) -> Self {
        let id = id.into();
        Self {
            set: Arc::new(ArchiveSet {
                name: id.clone(),
                archives: RwLock::new(archives),
            }),
            id,
            discovery: None,
        }
    }

    /// Source over the archives found directly under `root`, in name order.
    ///
    /// Subdirectories are opened as [`DirectoryArchive`]s holding files with
    /// `extension`; `*.mbtiles` files are opened as [`MbTilesArchive`]s. An
    /// MBTiles file that cannot be opened is skipped with a warning.
    pub fn discover(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        extension: &str,
    ) -> std::io::Result<Self> {
        let root = root.into();
        let archives = scan_directory(&root, extension)?;
        let mut source = Self::new(id, archives);
        source.discovery = Some((root, extension.to_string()));
        Ok(source)
    }

    /// Re-scan the discovery root, picking up added or removed archives.
    ///
    /// Returns the number of archives now in use. Sources built with
    /// [`new`](Self::new) keep their archives and return the current count.
    pub fn rescan(&self) -> std::io::Result<usize> {
        let Some((root, extension)) = &self.discovery else {
            return Ok(self.archive_count());
        };
        let archives = scan_directory(root, extension)?;
        let count = archives.len();
        *self.set.archives.write() = archives;
        info!(source = %self.id, archives = count, "Archive source rescanned");
        Ok(count)
    }

    pub fn archive_count(&self) -> usize {
        self.set.archives.read().len()
    }

    /// Names of the archives, in search order.
    pub fn archive_names(&self) -> Vec<String> {
        self.set
            .archives
            .read()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }
}

fn scan_directory(root: &Path, extension: &str) -> io::Result<Vec<Arc<dyn TileArchive>>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() || is_mbtiles(path))
        .collect();
    paths.sort();

    let mut archives: Vec<Arc<dyn TileArchive>> = Vec::with_capacity(paths.len());
    for path in paths {
        if path.is_dir() {
            archives.push(Arc::new(DirectoryArchive::open(path, extension)?));
            continue;
        }
        match MbTilesArchive::open(&path) {
            Ok(archive) => archives.push(Arc::new(archive)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable MBTiles file"),
        }
    }
    Ok(archives)
}

fn is_mbtiles(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(MBTILES_EXTENSION))
}

impl TileSource for ArchiveSource {
    fn cache_key_prefix(&self) -> String {
        self.id.clone()
    }

    fn locations_for(&self, _key: &TileKey, _high_density: bool) -> Vec<FetchLocation> {
        if self.set.archives.read().is_empty() {
            return Vec::new();
        }
        vec![FetchLocation::Archive(self.set.clone())]
    }

    fn metadata(&self) -> Arc<SourceMetadata> {
        Arc::new(SourceMetadata::named(self.id.clone(), self.bounds()))
    }

    fn bounds(&self) -> ZoomBounds {
        self.set.zoom_bounds().unwrap_or_default()
    }
}
