//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Root directory used when none is configured
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Identifier of this cache instance
    pub name: String,
    /// Root directory; relative paths resolve against the working directory
    pub cache_root: PathBuf,
    /// Ceiling in bytes that triggers an automatic trim, None = unbounded
    pub max_cache_size: Option<u64>,
    /// Lock wait allowed per file open, zero = wait indefinitely
    pub access_timeout: Duration,
    /// Walk the cache root at construction to seed the size counter
    pub eager_size_calculation: bool,
    /// Region used by index-style access when the caller names none
    pub default_region: Option<String>,
}

impl CacheConfig {
    /// Config rooted at `cache_root` with every other value defaulted.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FILE_CACHE_NAME` - Instance identifier (default: "file_cache")
    /// - `FILE_CACHE_ROOT` - Cache root directory (default: "cache")
    /// - `FILE_CACHE_MAX_SIZE` - Ceiling in bytes (default: unbounded)
    /// - `FILE_CACHE_ACCESS_TIMEOUT` - Lock wait, e.g. "250ms" (default: "0", indefinite)
    /// - `FILE_CACHE_EAGER_SIZE` - Seed size counter at startup (default: false)
    /// - `FILE_CACHE_DEFAULT_REGION` - Region for index-style access (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            name: env::var("FILE_CACHE_NAME").unwrap_or(defaults.name),
            cache_root: env::var("FILE_CACHE_ROOT")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_root),
            max_cache_size: env::var("FILE_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(defaults.max_cache_size),
            access_timeout: env::var("FILE_CACHE_ACCESS_TIMEOUT")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(defaults.access_timeout),
            eager_size_calculation: env::var("FILE_CACHE_EAGER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.eager_size_calculation),
            default_region: env::var("FILE_CACHE_DEFAULT_REGION")
                .ok()
                .or(defaults.default_region),
        }
    }

    /// Rejects configurations the cache can not be opened with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache root can not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The cache root as an absolute path.
    pub fn resolved_root(&self) -> Result<PathBuf> {
        if self.cache_root.is_absolute() {
            return Ok(self.cache_root.clone());
        }

        env::current_dir()
            .map(|cwd| cwd.join(&self.cache_root))
            .map_err(|e| CacheError::io(&self.cache_root, "resolve", e))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "file_cache".to_string(),
            cache_root: PathBuf::from(DEFAULT_CACHE_DIR),
            max_cache_size: None,
            access_timeout: Duration::ZERO,
            eager_size_calculation: false,
            default_region: None,
        }
    }
}
