//! Error types for the file cache
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

// == Codec Error ==
/// Failure to turn an entry into bytes or back.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The entry could not be serialized
    #[error("failed to encode cache entry: {0}")]
    Encode(String),

    /// The persisted bytes are corrupt, truncated or of an unknown layout
    #[error("failed to decode cache entry: {0}")]
    Decode(String),
}

// == Cache Error Enum ==
/// Unified error type for the file cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The entry file stayed locked by another accessor past the access timeout
    #[error("timed out after {waited:?} waiting for access to {}", path.display())]
    AccessTimeout {
        path: PathBuf,
        waited: Duration,
        #[source]
        source: io::Error,
    },

    /// The caller-supplied expiration policy is contradictory or out of range
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// The policy asks for something this cache does not implement
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Persisted bytes could not be encoded or decoded
    #[error("codec failure for {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// Underlying file-system failure, propagated unmodified
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Configuration rejected before the cache was opened
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key rejected before any I/O
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl CacheError {
    /// Wraps an I/O error with the path and operation it came from.
    pub fn io(path: impl AsRef<Path>, operation: &'static str, source: io::Error) -> Self {
        CacheError::Io {
            path: path.as_ref().to_path_buf(),
            operation,
            source,
        }
    }

    /// Wraps a codec failure with the entry path it concerns.
    pub fn codec(path: impl AsRef<Path>, source: CodecError) -> Self {
        CacheError::Codec {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for lock-wait timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::AccessTimeout { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the file cache.
pub type Result<T> = std::result::Result<T, CacheError>;
