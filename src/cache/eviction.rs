//! Eviction Module
//!
//! Whole-scope passes over the directory tree: trimming to a target size,
//! flushing expired entries, and enumeration.
//!
//! Every pass walks and decodes every entry in scope, O(n log n) for trims.
//! Keep them out of hot paths.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::events::CacheEvent;
use crate::cache::size::{directory_size, is_vanished};
use crate::cache::{AccessMode, CacheEntry, FileCache};
use crate::error::{CacheError, Result};

// == Trim Candidate ==
/// An entry file ordered by its stored deadline, then by path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrimCandidate {
    /// `None` never expires and sorts after every finite deadline
    deadline: Option<DateTime<Utc>>,
    path: PathBuf,
}

impl Ord for TrimCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for TrimCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FileCache {
    // == Trim To Size ==
    /// Deletes the soonest-to-expire entries until the scope holds at most
    /// `target` bytes, returning the size left.
    ///
    /// With no region the whole cache is in scope and its size comes from the
    /// running total (seeded from disk if it reads zero). A region is always
    /// measured from disk. Sliding entries are ordered by their stored
    /// deadline; the pass does not refresh them.
    pub fn trim_to_size(&self, target: u64, region: Option<&str>) -> Result<u64> {
        let original = match region {
            None => match self.size.current() {
                0 => self.size.recompute_from_disk(self.paths.root())?,
                current => current,
            },
            Some(_) => directory_size(&self.paths.region_path(region))?,
        };

        if target >= original {
            return Ok(original);
        }
        let amount = original - target;

        let mut candidates = Vec::new();
        for path in self.entry_files(region)? {
            // Undecodable files are skipped rather than aborting the pass
            if let Some(entry) = self.load(&path)? {
                candidates.push(TrimCandidate {
                    deadline: entry.policy.deadline(),
                    path,
                });
            }
        }
        candidates.sort();

        let mut removed = 0;
        let mut evicted = 0;
        for candidate in candidates {
            if removed >= amount {
                break;
            }
            let Some(file) = self.access.open(&candidate.path, AccessMode::Modify)? else {
                continue;
            };
            removed += file.unlink()?;
            evicted += 1;
        }

        self.size.subtract(removed);
        self.stats.record_evictions(evicted);

        let remaining = original.saturating_sub(removed);
        info!(
            region = ?region,
            original,
            target,
            removed,
            evicted,
            remaining,
            "cache trimmed"
        );
        self.events.emit(CacheEvent::Resized {
            new_size: remaining,
            max_size: self.max_cache_size,
        });

        Ok(remaining)
    }

    // == Flush ==
    /// Deletes every entry whose deadline has passed, returning bytes removed.
    pub fn flush(&self, region: Option<&str>) -> Result<u64> {
        self.flush_before(Utc::now(), region)
    }

    /// Deletes every entry whose stored deadline is before `min_date`.
    pub fn flush_before(&self, min_date: DateTime<Utc>, region: Option<&str>) -> Result<u64> {
        let stale = |entry: &CacheEntry| entry.policy.deadline().is_some_and(|d| d < min_date);

        let mut removed = 0;
        let mut flushed = 0;
        for path in self.entry_files(region)? {
            match self.load(&path)? {
                Some(entry) if stale(&entry) => {}
                _ => continue,
            }

            // Re-checked under the exclusive lock in case of a concurrent rewrite
            if let Some(bytes) = self.delete_if(&path, |current| current.is_some_and(stale))? {
                removed += bytes;
                flushed += 1;
            }
        }

        self.stats.record_expirations(flushed);
        debug!(region = ?region, removed, flushed, "flushed expired entries");
        Ok(removed)
    }

    // == Enumeration ==
    /// Keys of every decodable entry in scope.
    pub fn keys(&self, region: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.entry_files(region)? {
            if let Some(entry) = self.load(&path)? {
                keys.push(entry.key);
            }
        }
        Ok(keys)
    }

    /// Key/payload pairs in scope, read without evaluating expiration.
    pub fn entries(&self, region: Option<&str>) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        let mut entries = Vec::new();
        for path in self.entry_files(region)? {
            if let Some(entry) = self.load(&path)? {
                entries.push((entry.key, entry.payload));
            }
        }
        Ok(entries)
    }

    /// Number of entry files in scope. Nothing is decoded.
    pub fn count(&self, region: Option<&str>) -> Result<u64> {
        Ok(self.entry_files(region)?.len() as u64)
    }

    /// Bytes on disk in scope, from a directory walk.
    pub fn cache_size(&self, region: Option<&str>) -> Result<u64> {
        directory_size(&self.paths.scope_path(region))
    }

    /// Entry files below the scope directory, in path order.
    fn entry_files(&self, region: Option<&str>) -> Result<Vec<PathBuf>> {
        let scope = self.paths.scope_path(region);
        let mut files = Vec::new();

        for item in WalkDir::new(&scope).sort_by_file_name() {
            let item = match item {
                Ok(item) => item,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(walk_error(&scope, e)),
            };
            if item.file_type().is_file() {
                files.push(item.into_path());
            }
        }

        if files.is_empty() {
            debug!(scope = %scope.display(), "no entry files in scope");
        }
        Ok(files)
    }
}

fn walk_error(scope: &Path, err: walkdir::Error) -> CacheError {
    let at = err.path().unwrap_or(scope).to_path_buf();
    warn!(path = %at.display(), error = %err, "cache walk failed");
    CacheError::io(at, "walk", io::Error::from(err))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheItemPolicy;
    use crate::config::CacheConfig;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_cache(dir: &TempDir) -> FileCache {
        FileCache::open(CacheConfig::new(dir.path())).unwrap()
    }

    fn in_hours(hours: i64) -> CacheItemPolicy {
        CacheItemPolicy::absolute(Utc::now() + chrono::Duration::hours(hours))
    }

    fn candidate(deadline: Option<DateTime<Utc>>, path: &str) -> TrimCandidate {
        TrimCandidate {
            deadline,
            path: PathBuf::from(path),
        }
    }

    fn file_size(cache: &FileCache, key: &str) -> u64 {
        fs::metadata(cache.entry_path(key, None)).unwrap().len()
    }

    #[test]
    fn test_candidate_ordering() {
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(1);
        let mut candidates = vec![
            candidate(None, "a"),
            candidate(Some(late), "b"),
            candidate(Some(early), "d"),
            candidate(Some(early), "c"),
        ];
        candidates.sort();

        let order: Vec<_> = candidates.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("c"),
                PathBuf::from("d"),
                PathBuf::from("b"),
                PathBuf::from("a")
            ]
        );
    }

    #[test]
    fn test_trim_noop_when_under_target() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.write("k", None, vec![0; 64], &in_hours(1)).unwrap();
        let size = cache.current_size();

        assert_eq!(cache.trim_to_size(size, None).unwrap(), size);
        assert!(cache.exists("k", None).unwrap());
    }

    #[test]
    fn test_trim_evicts_soonest_deadline_first() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        // Insertion order differs from deadline order
        cache.write("late", None, vec![0; 100], &in_hours(3)).unwrap();
        cache.write("soon", None, vec![0; 100], &in_hours(1)).unwrap();
        cache.write("never", None, vec![0; 100], &CacheItemPolicy::never()).unwrap();
        cache.write("mid", None, vec![0; 100], &in_hours(2)).unwrap();

        let total = cache.current_size();
        let soon = file_size(&cache, "soon");
        let mid = file_size(&cache, "mid");
        let remaining = cache.trim_to_size(total - soon - 1, None).unwrap();

        // Freeing one byte more than "soon" holds takes the next deadline too
        assert!(!cache.exists("soon", None).unwrap());
        assert!(!cache.exists("mid", None).unwrap());
        assert!(cache.exists("late", None).unwrap());
        assert!(cache.exists("never", None).unwrap());
        assert_eq!(remaining, total - soon - mid);
        assert_eq!(remaining, cache.current_size());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_trim_region_only() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);

        cache.write("a", Some("one"), vec![0; 100], &in_hours(1)).unwrap();
        cache.write("b", Some("two"), vec![0; 100], &in_hours(1)).unwrap();

        let remaining = cache.trim_to_size(0, Some("one")).unwrap();
        assert_eq!(remaining, 0);
        assert!(!cache.exists("a", Some("one")).unwrap());
        assert!(cache.exists("b", Some("two")).unwrap());
    }

    #[test]
    fn test_trim_seeds_counter_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let writer = open_cache(&dir);
            writer.write("k", None, vec![0; 100], &in_hours(1)).unwrap();
        }

        // A fresh instance without eager sizing starts at zero
        let cache = open_cache(&dir);
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.trim_to_size(0, None).unwrap(), 0);
        assert!(!cache.exists("k", None).unwrap());
    }

    #[test]
    fn test_trim_emits_resized() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            cache.subscribe(move |event| seen.lock().push(*event));
        }

        cache.write("k", None, vec![0; 100], &in_hours(1)).unwrap();
        cache.trim_to_size(0, None).unwrap();

        assert_eq!(
            seen.lock().as_slice(),
            &[CacheEvent::Resized {
                new_size: 0,
                max_size: None
            }]
        );
    }

    #[test]
    fn test_flush_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let past = CacheItemPolicy::absolute(Utc::now() - chrono::Duration::minutes(5));

        cache.write("old", None, vec![0; 10], &past).unwrap();
        cache.write("fresh", None, vec![0; 10], &in_hours(1)).unwrap();
        cache.write("forever", None, vec![0; 10], &CacheItemPolicy::never()).unwrap();

        let removed = cache.flush(None).unwrap();
        assert!(removed > 0);
        assert!(!cache.exists("old", None).unwrap());
        assert!(cache.exists("fresh", None).unwrap());
        assert!(cache.exists("forever", None).unwrap());
        assert_eq!(cache.current_size(), cache.cache_size(None).unwrap());
    }

    #[test]
    fn test_flush_before_custom_date() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.write("k", Some("r"), vec![0; 10], &in_hours(1)).unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(cache.flush_before(later, Some("r")).unwrap() > 0);
        assert_eq!(cache.count(Some("r")).unwrap(), 0);
    }

    #[test]
    fn test_keys_and_count_by_scope() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        let policy = CacheItemPolicy::never();

        cache.write("a", None, b"1".to_vec(), &policy).unwrap();
        cache.write("b", Some("r"), b"2".to_vec(), &policy).unwrap();
        cache.write("c", Some("r"), b"3".to_vec(), &policy).unwrap();

        let mut region_keys = cache.keys(Some("r")).unwrap();
        region_keys.sort();
        assert_eq!(region_keys, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(cache.count(None).unwrap(), 3);
        assert_eq!(cache.count(Some("missing")).unwrap(), 0);

        let mut entries = cache.entries(Some("r")).unwrap();
        entries.sort();
        assert_eq!(entries[0], ("b".to_string(), Some(b"2".to_vec())));
    }

    #[test]
    fn test_undecodable_files_skipped_by_trim_and_enumeration() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.write("good", None, b"v".to_vec(), &in_hours(1)).unwrap();

        let bad = cache.entry_path("bad", None);
        fs::create_dir_all(bad.parent().unwrap()).unwrap();
        fs::write(&bad, vec![0xff; 50]).unwrap();
        cache.recompute_size().unwrap();

        let remaining = cache.trim_to_size(0, None).unwrap();
        assert_eq!(remaining, 50);
        assert_eq!(cache.cache_size(None).unwrap(), 50);
        assert!(bad.exists());
        assert!(!cache.exists("good", None).unwrap());

        assert!(cache.keys(None).unwrap().is_empty());
        assert!(cache.entries(None).unwrap().is_empty());
        assert_eq!(cache.count(None).unwrap(), 1);
    }
}
