//! Size Accounting Module
//!
//! Approximate running total of the bytes held by the cache. The counter is
//! a lone atomic: concurrent writers may make it drift transiently, and
//! separate instances over one directory each keep their own total.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CacheError, Result};

// == Size Accountant ==
#[derive(Debug, Default)]
pub struct SizeAccountant {
    current: AtomicU64,
}

impl SizeAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the total, returning the new value.
    pub fn add(&self, bytes: u64) -> u64 {
        self.current
            .fetch_add(bytes, Ordering::Relaxed)
            .saturating_add(bytes)
    }

    /// Lowers the total, clamping at zero, returning the new value.
    pub fn subtract(&self, bytes: u64) -> u64 {
        let previous = self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                Some(value.saturating_sub(bytes))
            })
            .unwrap_or_default();
        previous.saturating_sub(bytes)
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    // == Recompute ==
    /// Replaces the total with a full walk of `root`.
    pub fn recompute_from_disk(&self, root: &Path) -> Result<u64> {
        let size = directory_size(root)?;
        self.current.store(size, Ordering::Relaxed);
        debug!(root = %root.display(), size, "recomputed cache size from disk");
        Ok(size)
    }
}

/// Sum of the lengths of every file below `path`; zero when it is missing.
pub fn directory_size(path: &Path) -> Result<u64> {
    let mut total = 0;

    for item in WalkDir::new(path) {
        let item = match item {
            Ok(item) => item,
            Err(e) if is_vanished(&e) => continue,
            Err(e) => {
                let at = e.path().unwrap_or(path).to_path_buf();
                return Err(CacheError::io(at, "walk", io::Error::from(e)));
            }
        };

        if !item.file_type().is_file() {
            continue;
        }

        match item.metadata() {
            Ok(meta) => total += meta.len(),
            Err(e) if is_vanished(&e) => continue,
            Err(e) => return Err(CacheError::io(item.path(), "stat", io::Error::from(e))),
        }
    }

    Ok(total)
}

/// Files and directories removed mid-walk are not errors.
pub(crate) fn is_vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}
