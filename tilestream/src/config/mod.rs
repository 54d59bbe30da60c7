//! Configuration file and size parsing.
//!
//! ```ini
//! [cache]
//! directory = ~/tiles
//! memory_size = 64MB
//! disk_size = 100MB
//! disk_enabled = true
//!
//! [network]
//! user_agent = tilestream/0.1
//! timeout = 10
//! http_cache_size = 10MB
//! http_cache_ttl = 300
//!
//! [pool]
//! archive_threads = 8
//! network_threads = 2
//! queue_size = 40
//!
//! [display]
//! high_density = false
//! ```

mod file;
mod size;

pub use file::{
    config_file_path, CacheSettings, ConfigFileError, DisplaySettings, NetworkSettings,
    PoolSettings, TileStreamConfig,
};
pub use size::{format_size, parse_size, SizeParseError};
