//! Two-tier tile cache.
//!
//! # Architecture
//!
//! ```text
//! TileCache::get(key)
//!     │
//!     ├─► MemoryTier (LRU, decoded RGBA, byte budget)
//!     │       └─ hit ──────────────────────────────► TileImage (MemoryCache)
//!     │
//!     └─► DiskTier (LRU, PNG files, byte budget)
//!             └─ hit ─► promote into memory ───────► TileImage (DiskCache)
//! ```
//!
//! The two tiers evict independently. The disk tier can be switched off and
//! on at runtime, and switches itself off after a write failure so a full or
//! read-only volume degrades to memory-only caching instead of failing
//! requests.

mod config;
mod disk;
mod error;
mod memory;
mod stats;
mod system;

pub use config::{CacheConfig, CacheLocation, DEFAULT_DISK_SIZE, DEFAULT_MEMORY_SIZE};
pub use disk::DiskTier;
pub use error::CacheError;
pub use memory::{MemoryInsert, MemoryTier};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use system::TileCache;
