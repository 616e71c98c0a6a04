//! Path Mapping Module
//!
//! Deterministic mapping from `(region, key)` to a location under the cache
//! root. The layout must be identical across process runs, so hashing uses
//! SHA-256 rather than any per-process seeded hasher.
//!
//! ```text
//! <root>/_/<shard>/<rest>            default region
//! <root>/_<region hash>/<shard>/<rest>  named region
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::cache::{REGION_BUCKET_PREFIX, SHARD_PREFIX_LEN};

// == Key Path Mapper ==
/// Maps keys and regions to entry file paths.
#[derive(Debug, Clone)]
pub struct KeyPathMapper {
    root: PathBuf,
}

impl KeyPathMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // == Region Path ==
    /// Directory holding every entry of a region.
    ///
    /// `None` is the default region and maps to the bare prefix; a region
    /// named `""` is a distinct namespace with its own hash bucket.
    pub fn region_path(&self, region: Option<&str>) -> PathBuf {
        let bucket = match region {
            None => REGION_BUCKET_PREFIX.to_string(),
            Some(name) => format!("{}{}", REGION_BUCKET_PREFIX, hash_hex(name)),
        };
        self.root.join(bucket)
    }

    // == Entry Path ==
    /// File holding the entry for `key` in `region`.
    ///
    /// The key hash is split into a shard directory and a file name. Distinct
    /// keys with equal hashes share a file; the key stored inside the entry
    /// is authoritative.
    pub fn entry_path(&self, key: &str, region: Option<&str>) -> PathBuf {
        let hash = hash_hex(key);
        let (shard, rest) = hash.split_at(SHARD_PREFIX_LEN);
        self.region_path(region).join(shard).join(rest)
    }

    /// Directory walked by whole-scope operations: the region, or the whole
    /// root when no region is named.
    pub fn scope_path(&self, region: Option<&str>) -> PathBuf {
        match region {
            Some(_) => self.region_path(region),
            None => self.root.clone(),
        }
    }
}

// == Hashing ==
/// Stable 32-bit hash of a string, taken from the head of its SHA-256 digest.
pub fn stable_hash(value: &str) -> u32 {
    let digest = Sha256::digest(value.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Fixed-width lowercase hex form of [`stable_hash`].
fn hash_hex(value: &str) -> String {
    format!("{:08x}", stable_hash(value))
}
