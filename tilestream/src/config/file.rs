//! INI configuration file.
//!
//! Every key is optional; anything missing keeps its default. See
//! [`TileStreamConfig::to_ini_string`] for the full layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::size::{format_size, parse_size};
use crate::cache::{CacheConfig, DEFAULT_DISK_SIZE, DEFAULT_MEMORY_SIZE};
use crate::executor::{
    PoolConfig, DEFAULT_ARCHIVE_THREADS, DEFAULT_NETWORK_THREADS, DEFAULT_QUEUE_SIZE,
};
use crate::provider::{
    HttpSettings, DEFAULT_RESPONSE_CACHE_BYTES, DEFAULT_RESPONSE_CACHE_TTL, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    Write(#[source] std::io::Error),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFileError {
    fn invalid(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: Option<PathBuf>,
    pub memory_size: u64,
    pub disk_size: u64,
    pub disk_enabled: bool,
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub http_cache_size: u64,
    pub http_cache_ttl_secs: u64,
}

/// `[pool]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub archive_threads: usize,
    pub network_threads: usize,
    pub queue_size: usize,
}

/// `[display]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Request `@2x` tiles from sources that offer them.
    pub high_density: bool,
}

/// Complete file-backed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileStreamConfig {
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub pool: PoolSettings,
    pub display: DisplaySettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            memory_size: DEFAULT_MEMORY_SIZE,
            disk_size: DEFAULT_DISK_SIZE,
            disk_enabled: true,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            http_cache_size: DEFAULT_RESPONSE_CACHE_BYTES,
            http_cache_ttl_secs: DEFAULT_RESPONSE_CACHE_TTL.as_secs(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            archive_threads: DEFAULT_ARCHIVE_THREADS,
            network_threads: DEFAULT_NETWORK_THREADS,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl TileStreamConfig {
    /// Load from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Read`] for unreadable or malformed files and
    /// [`ConfigFileError::InvalidValue`] for values that do not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parse configuration text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigFileError::Read(ini::Error::Parse(e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut config = Self::default();

        // [cache]
        if let Some(section) = ini.section(Some("cache")) {
            if let Some(v) = section.get("directory") {
                let v = v.trim();
                if !v.is_empty() {
                    config.cache.directory = Some(expand_tilde(v));
                }
            }
            if let Some(v) = section.get("memory_size") {
                config.cache.memory_size = size_value("cache", "memory_size", v)?;
            }
            if let Some(v) = section.get("disk_size") {
                config.cache.disk_size = size_value("cache", "disk_size", v)?;
            }
            if let Some(v) = section.get("disk_enabled") {
                config.cache.disk_enabled = bool_value("cache", "disk_enabled", v)?;
            }
        }

        // [network]
        if let Some(section) = ini.section(Some("network")) {
            if let Some(v) = section.get("user_agent") {
                let v = v.trim();
                if !v.is_empty() {
                    config.network.user_agent = v.to_string();
                }
            }
            if let Some(v) = section.get("timeout") {
                let secs = number_value("network", "timeout", v)?;
                if secs == 0 {
                    return Err(ConfigFileError::invalid(
                        "network",
                        "timeout",
                        v,
                        "must be at least 1 second",
                    ));
                }
                config.network.timeout_secs = secs;
            }
            if let Some(v) = section.get("http_cache_size") {
                config.network.http_cache_size = size_value("network", "http_cache_size", v)?;
            }
            if let Some(v) = section.get("http_cache_ttl") {
                config.network.http_cache_ttl_secs = number_value("network", "http_cache_ttl", v)?;
            }
        }

        // [pool]
        if let Some(section) = ini.section(Some("pool")) {
            if let Some(v) = section.get("archive_threads") {
                config.pool.archive_threads = number_value("pool", "archive_threads", v)? as usize;
            }
            if let Some(v) = section.get("network_threads") {
                config.pool.network_threads = number_value("pool", "network_threads", v)? as usize;
            }
            if let Some(v) = section.get("queue_size") {
                config.pool.queue_size = number_value("pool", "queue_size", v)? as usize;
            }
        }

        // [display]
        if let Some(section) = ini.section(Some("display")) {
            if let Some(v) = section.get("high_density") {
                config.display.high_density = bool_value("display", "high_density", v)?;
            }
        }

        Ok(config)
    }

    /// Render the configuration as INI text.
    pub fn to_ini_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.to_ini().write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::Write)?;
        }
        self.to_ini().write_to_file(path).map_err(ConfigFileError::Write)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("cache"))
            .set(
                "directory",
                self.cache
                    .directory
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default(),
            )
            .set("memory_size", format_size(self.cache.memory_size))
            .set("disk_size", format_size(self.cache.disk_size))
            .set("disk_enabled", self.cache.disk_enabled.to_string());
        ini.with_section(Some("network"))
            .set("user_agent", self.network.user_agent.clone())
            .set("timeout", self.network.timeout_secs.to_string())
            .set("http_cache_size", format_size(self.network.http_cache_size))
            .set("http_cache_ttl", self.network.http_cache_ttl_secs.to_string());
        ini.with_section(Some("pool"))
            .set("archive_threads", self.pool.archive_threads.to_string())
            .set("network_threads", self.pool.network_threads.to_string())
            .set("queue_size", self.pool.queue_size.to_string());
        ini.with_section(Some("display"))
            .set("high_density", self.display.high_density.to_string());
        ini
    }

    // =========================================================================
    // Component settings
    // =========================================================================

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            directory: self.cache.directory.clone(),
            memory_size: self.cache.memory_size,
            disk_size: self.cache.disk_size,
            disk_enabled: self.cache.disk_enabled,
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.network.user_agent.clone(),
            timeout: Duration::from_secs(self.network.timeout_secs),
            response_cache_bytes: self.network.http_cache_size,
            response_cache_ttl: Duration::from_secs(self.network.http_cache_ttl_secs),
        }
    }

    /// Pool sizing for archive providers; threads clamped to the pool limit.
    pub fn archive_pool(&self) -> PoolConfig {
        PoolConfig::new(self.pool.archive_threads, self.pool.queue_size)
    }

    /// Pool sizing for network providers; threads clamped to the pool limit.
    pub fn network_pool(&self) -> PoolConfig {
        PoolConfig::new(self.pool.network_threads, self.pool.queue_size)
    }
}

/// `{platform config dir}/tilestream/config.ini`.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilestream")
        .join("config.ini")
}

fn size_value(section: &str, key: &str, value: &str) -> Result<u64, ConfigFileError> {
    parse_size(value).map_err(|_| {
        ConfigFileError::invalid(section, key, value, "expected a size like '64MB' or '1GB'")
    })
}

fn number_value(section: &str, key: &str, value: &str) -> Result<u64, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::invalid(section, key, value, "must be a non-negative integer"))
}

fn bool_value(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigFileError::invalid(section, key, value, "must be true or false")),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TileStreamConfig::default();
        assert_eq!(config.cache.memory_size, 64 * 1024 * 1024);
        assert_eq!(config.cache.disk_size, 100 * 1024 * 1024);
        assert!(config.cache.disk_enabled);
        assert_eq!(config.network.timeout_secs, 10);
        assert_eq!(config.pool.archive_threads, 8);
        assert_eq!(config.pool.network_threads, 2);
        assert_eq!(config.pool.queue_size, 40);
        assert!(!config.display.high_density);
    }

    #[test]
    fn test_parse_full_file() {
        let config = TileStreamConfig::from_ini_str(
            r#"
[cache]
directory = /var/cache/tiles
memory_size = 32MB
disk_size = 1GB
disk_enabled = false

[network]
user_agent = viewer/2.0
timeout = 30
http_cache_size = 0
http_cache_ttl = 60

[pool]
archive_threads = 4
network_threads = 16
queue_size = 100

[display]
high_density = yes
"#,
        )
        .unwrap();

        assert_eq!(config.cache.directory, Some(PathBuf::from("/var/cache/tiles")));
        assert_eq!(config.cache.memory_size, 32 * 1024 * 1024);
        assert_eq!(config.cache.disk_size, 1024 * 1024 * 1024);
        assert!(!config.cache.disk_enabled);
        assert_eq!(config.network.user_agent, "viewer/2.0");
        assert_eq!(config.http_settings().timeout, Duration::from_secs(30));
        assert_eq!(config.http_settings().response_cache_bytes, 0);
        assert_eq!(config.archive_pool(), PoolConfig::new(4, 100));
        // Clamped to the pool limit
        assert_eq!(config.network_pool().threads, 8);
        assert!(config.display.high_density);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TileStreamConfig::from_ini_str("[pool]\nqueue_size = 10\n").unwrap();
        assert_eq!(config.pool.queue_size, 10);
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.network, NetworkSettings::default());
    }

    #[test]
    fn test_invalid_values_name_section_and_key() {
        let err = TileStreamConfig::from_ini_str("[cache]\nmemory_size = lots\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "cache");
                assert_eq!(key, "memory_size");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(TileStreamConfig::from_ini_str("[network]\ntimeout = 0\n").is_err());
        assert!(TileStreamConfig::from_ini_str("[display]\nhigh_density = maybe\n").is_err());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TileStreamConfig::load(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, TileStreamConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.ini");

        let mut config = TileStreamConfig::default();
        config.cache.directory = Some(dir.path().join("tiles"));
        config.cache.memory_size = 16 * 1024 * 1024;
        config.display.high_density = true;
        config.save_to(&path).unwrap();

        assert_eq!(TileStreamConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_cache_config_mirrors_settings() {
        let mut config = TileStreamConfig::default();
        config.cache.disk_enabled = false;
        let cache = config.cache_config();
        assert!(!cache.disk_enabled);
        assert_eq!(cache.memory_size, DEFAULT_MEMORY_SIZE);
    }
}
