//! Cache Store Module
//!
//! The engine: entry reads and writes through locked files and the codec,
//! lazy expiration, sliding refresh, and size accounting that triggers a trim
//! when the ceiling is crossed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::events::{CacheEvent, EventBus};
use crate::cache::{
    AccessMode, BincodeCodec, CacheEntry, CacheItemPolicy, CacheStats, Codec, ExpirationPolicy,
    FileAccess, KeyPathMapper, LockedFile, SizeAccountant, StatsSnapshot, TRIM_HEADROOM_PERCENT,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == File Cache ==
/// Disk-resident cache over a directory tree.
///
/// Every method takes `&self`; share an instance between threads with `Arc`.
/// Several instances (or processes) may use the same directory at once, each
/// with its own approximate size counter.
pub struct FileCache {
    /// Caller-supplied instance identifier
    name: String,
    pub(super) paths: KeyPathMapper,
    pub(super) access: FileAccess,
    pub(super) codec: Arc<dyn Codec>,
    pub(super) size: SizeAccountant,
    pub(super) stats: CacheStats,
    pub(super) events: EventBus,
    pub(super) max_cache_size: Option<u64>,
    /// Set while an automatic trim runs so concurrent writers do not pile on
    auto_trimming: AtomicBool,
}

impl FileCache {
    // == Constructor ==
    /// Opens a cache with the default codec.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(BincodeCodec))
    }

    /// Opens a cache that persists entries through `codec`.
    pub fn with_codec(config: CacheConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        config.validate()?;
        let root = config.resolved_root()?;

        let cache = Self {
            name: config.name,
            paths: KeyPathMapper::new(root),
            access: FileAccess::new(config.access_timeout),
            codec,
            size: SizeAccountant::new(),
            stats: CacheStats::new(),
            events: EventBus::new(),
            max_cache_size: config.max_cache_size,
            auto_trimming: AtomicBool::new(false),
        };

        if config.eager_size_calculation {
            cache.size.recompute_from_disk(cache.paths.root())?;
        }

        info!(
            name = %cache.name,
            root = %cache.paths.root().display(),
            max_cache_size = ?cache.max_cache_size,
            current_size = cache.size.current(),
            "file cache opened"
        );

        Ok(cache)
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_dir(&self) -> &Path {
        self.paths.root()
    }

    pub fn max_cache_size(&self) -> Option<u64> {
        self.max_cache_size
    }

    /// Approximate bytes held, as tracked in memory.
    pub fn current_size(&self) -> u64 {
        self.size.current()
    }

    /// Replaces the running total with a full walk of the cache root.
    pub fn recompute_size(&self) -> Result<u64> {
        self.size.recompute_from_disk(self.paths.root())
    }

    /// File that holds (or would hold) `key` in `region`.
    pub fn entry_path(&self, key: &str, region: Option<&str>) -> PathBuf {
        self.paths.entry_path(key, region)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.size.current(), self.max_cache_size)
    }

    /// Registers a listener for ceiling and resize notifications.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener);
    }

    // == Read ==
    /// Reads the live entry for `key`, or `None`.
    ///
    /// An expired entry is deleted and reported absent. A sliding entry gets
    /// its deadline pushed forward, rewriting the file when the move is large
    /// enough. Undecodable files read as absent.
    pub fn read(&self, key: &str, region: Option<&str>) -> Result<Option<CacheEntry>> {
        validate_key(key)?;
        let path = self.paths.entry_path(key, region);

        let entry = match self.load(&path)? {
            Some(entry) if entry.key == key => entry,
            Some(other) => {
                debug!(key, stored = %other.key, "entry file belongs to a colliding key");
                self.stats.record_miss();
                return Ok(None);
            }
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
        };

        let now = Utc::now();
        if entry.is_expired_at(now) {
            let removed = self.delete_if(&path, |current| {
                current.is_some_and(|e| e.key == key && e.is_expired_at(now))
            })?;
            if removed.is_some() {
                debug!(key, path = %path.display(), "expired entry deleted on read");
                self.stats.record_expirations(1);
            }
            self.stats.record_miss();
            return Ok(None);
        }

        self.stats.record_hit();

        match entry.policy.refreshed_at(now) {
            Some(policy) => self.refresh(&path, entry, policy),
            None => Ok(Some(entry)),
        }
    }

    // == Write ==
    /// Stores `payload` under `key`, returning the previous live payload.
    ///
    /// The policy is validated before any I/O. The old file contents are
    /// superseded whole under an exclusive lock.
    pub fn write(
        &self,
        key: &str,
        region: Option<&str>,
        payload: Vec<u8>,
        policy: &CacheItemPolicy,
    ) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let now = Utc::now();
        let policy = policy.validate(now)?;

        let path = self.paths.entry_path(key, region);
        let entry = CacheEntry::new(key, payload, policy);
        let bytes = self
            .codec
            .encode(&entry)
            .map_err(|e| CacheError::codec(&path, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, "create", e))?;
        }

        let mut file = self.access.open_for_write(&path)?;
        let old_size = file.size()?;
        let previous = if old_size > 0 {
            let old_bytes = file.read_all()?;
            self.codec
                .decode(&old_bytes)
                .ok()
                .filter(|old| old.key == key && !old.is_expired_at(now))
                .and_then(|old| old.payload)
        } else {
            None
        };
        let total = self.rewrite(&mut file, old_size, &bytes)?;
        drop(file);
        debug!(key, path = %path.display(), bytes = bytes.len(), total, "entry written");

        self.enforce_ceiling(total)?;
        Ok(previous)
    }

    // == Remove ==
    /// Deletes the entry for `key`, returning its live payload.
    ///
    /// A file owned by a colliding key is left alone.
    pub fn remove(&self, key: &str, region: Option<&str>) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.paths.entry_path(key, region);

        let Some(mut file) = self.access.open(&path, AccessMode::Modify)? else {
            return Ok(None);
        };

        let bytes = file.read_all()?;
        let previous = match self.codec.decode(&bytes) {
            Ok(entry) if entry.key != key => return Ok(None),
            Ok(entry) if entry.is_expired_at(Utc::now()) => None,
            Ok(entry) => entry.payload,
            Err(e) => {
                debug!(key, error = %e, "removing undecodable entry file");
                None
            }
        };

        let removed = file.unlink()?;
        self.size.subtract(removed);
        debug!(key, path = %path.display(), removed, "entry removed");
        Ok(previous)
    }

    // == Exists ==
    /// Whether an entry file is present. Expiration is not evaluated.
    pub fn exists(&self, key: &str, region: Option<&str>) -> Result<bool> {
        validate_key(key)?;
        let path = self.paths.entry_path(key, region);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, "stat", e)),
        }
    }

    // == Policy Of ==
    /// The stored policy for `key`, without touching the entry.
    pub fn policy_of(&self, key: &str, region: Option<&str>) -> Result<Option<ExpirationPolicy>> {
        validate_key(key)?;
        let path = self.paths.entry_path(key, region);
        Ok(self
            .load(&path)?
            .filter(|entry| entry.key == key)
            .map(|entry| entry.policy))
    }

    /// Reads several keys of one region.
    pub fn get_many<'k, I>(
        &self,
        keys: I,
        region: Option<&str>,
    ) -> Result<Vec<(String, Option<CacheEntry>)>>
    where
        I: IntoIterator<Item = &'k str>,
    {
        keys.into_iter()
            .map(|key| Ok((key.to_string(), self.read(key, region)?)))
            .collect()
    }

    // == Internal Helpers ==
    /// Decodes the entry at `path` under a shared lock.
    ///
    /// Missing and undecodable files both yield `None`; lock timeouts and
    /// I/O failures propagate.
    pub(super) fn load(&self, path: &Path) -> Result<Option<CacheEntry>> {
        let Some(mut file) = self.access.open(path, AccessMode::Read)? else {
            return Ok(None);
        };
        let bytes = file.read_all()?;
        drop(file);

        match self.codec.decode(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring undecodable entry file");
                Ok(None)
            }
        }
    }

    /// Deletes the file at `path` if `predicate` holds for its contents,
    /// re-read under an exclusive lock. Returns the bytes removed, already
    /// subtracted from the running total.
    pub(super) fn delete_if<P>(&self, path: &Path, predicate: P) -> Result<Option<u64>>
    where
        P: FnOnce(Option<&CacheEntry>) -> bool,
    {
        let Some(mut file) = self.access.open(path, AccessMode::Modify)? else {
            return Ok(None);
        };

        let bytes = file.read_all()?;
        let current = self.codec.decode(&bytes).ok();
        if !predicate(current.as_ref()) {
            return Ok(None);
        }

        let removed = file.unlink()?;
        self.size.subtract(removed);
        Ok(Some(removed))
    }

    /// Rewrites a sliding entry with its pushed-forward deadline.
    ///
    /// Skipped when the file changed since it was read, so a newer write is
    /// never clobbered by a stale refresh.
    fn refresh(
        &self,
        path: &Path,
        mut entry: CacheEntry,
        policy: ExpirationPolicy,
    ) -> Result<Option<CacheEntry>> {
        let Some(mut file) = self.access.open(path, AccessMode::Modify)? else {
            return Ok(Some(entry));
        };

        let old_bytes = file.read_all()?;
        if self.codec.decode(&old_bytes).ok().as_ref() != Some(&entry) {
            debug!(key = %entry.key, "entry changed before sliding refresh, skipping");
            return Ok(Some(entry));
        }

        entry.policy = policy;
        let bytes = self
            .codec
            .encode(&entry)
            .map_err(|e| CacheError::codec(path, e))?;
        let total = self.rewrite(&mut file, old_bytes.len() as u64, &bytes)?;
        drop(file);
        debug!(key = %entry.key, deadline = ?entry.policy.deadline(), "sliding deadline refreshed");

        self.enforce_ceiling(total)?;
        Ok(Some(entry))
    }

    /// Replaces the contents of a locked file and moves the running total
    /// from `old_size` to the new length, returning the new total.
    ///
    /// A failed write may leave the file truncated or partial, so the total
    /// is reconciled with whatever length is left on disk.
    fn rewrite(&self, file: &mut LockedFile, old_size: u64, bytes: &[u8]) -> Result<u64> {
        if let Err(e) = file.replace(bytes) {
            let left = file.size().unwrap_or(0);
            self.size.subtract(old_size);
            self.size.add(left);
            warn!(path = %file.path().display(), left, error = %e, "entry rewrite failed");
            return Err(e);
        }

        self.size.subtract(old_size);
        Ok(self.size.add(bytes.len() as u64))
    }

        /// Trims to the headroom target once `total` passes the ceiling.
    fn enforce_ceiling(&self, total: u64) -> Result<()> {
        let Some(max_size) = self.max_cache_size else {
            return Ok(());
        };
        if total <= max_size {
            return Ok(());
        }

        self.events.emit(CacheEvent::CeilingReached {
            current_size: total,
            max_size,
        });

        if self
            .auto_trimming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(total, max_size, "trim already running, skipping");
            return Ok(());
        }

        let target = headroom_target(max_size);
        info!(total, max_size, target, "cache ceiling reached, trimming");
        let result = self.trim_to_size(target, None);
        self.auto_trimming.store(false, Ordering::Release);

        result.map(|_| ())
    }
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("name", &self.name)
            .field("root", &self.paths.root())
            .field("max_cache_size", &self.max_cache_size)
            .field("current_size", &self.size.current())
            .finish()
    }
}

// == Utility Functions ==
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key can not be empty".to_string()));
    }
    Ok(())
}

/// Size an automatic trim shrinks the cache to.
pub(super) fn headroom_target(max_size: u64) -> u64 {
    (u128::from(max_size) * u128::from(TRIM_HEADROOM_PERCENT) / 100) as u64
}
