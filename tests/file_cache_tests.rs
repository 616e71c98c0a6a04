//! Integration Tests for the File Cache
//!
//! Exercises the engine end to end against a temporary cache root: expiration,
//! eviction order, ceiling enforcement, persistence and lock contention.

use std::fs;
use std::sync::{Arc, Mutex};
use std::thread::{self, sleep};
use std::time::Duration;

use chrono::Utc;
use file_cache::cache::{AccessMode, FileAccess};
use file_cache::{CacheConfig, CacheError, CacheEvent, CacheItemPolicy, FileCache};
use tempfile::TempDir;

// == Helper Functions ==

fn open_cache(dir: &TempDir) -> FileCache {
    FileCache::open(CacheConfig::new(dir.path())).unwrap()
}

fn file_size(cache: &FileCache, key: &str) -> u64 {
    fs::metadata(cache.entry_path(key, None)).unwrap().len()
}

// == Expiration ==

#[test]
fn test_past_deadline_reads_absent_and_deletes_file() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let yesterday = Utc::now() - chrono::Duration::days(1);

    cache
        .write("a", None, b"x".to_vec(), &CacheItemPolicy::absolute(yesterday))
        .unwrap();
    let path = cache.entry_path("a", None);
    assert!(path.exists());

    assert!(cache.read("a", None).unwrap().is_none());
    assert!(!path.exists());
    assert_eq!(cache.current_size(), 0);
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn test_sliding_window_extends_on_read() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let policy = CacheItemPolicy::sliding(Duration::from_millis(500));
    cache.write("s", None, b"v".to_vec(), &policy).unwrap();

    // Well past the original deadline, but never idle for a whole window
    for _ in 0..5 {
        sleep(Duration::from_millis(200));
        let entry = cache.read("s", None).unwrap();
        assert_eq!(entry.and_then(|e| e.payload), Some(b"v".to_vec()));
    }

    sleep(Duration::from_millis(700));
    assert!(cache.read("s", None).unwrap().is_none());
    assert!(!cache.exists("s", None).unwrap());
}

#[test]
fn test_absolute_entry_not_extended_by_reads() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    cache
        .write(
            "a",
            None,
            b"v".to_vec(),
            &CacheItemPolicy::expires_in(Duration::from_millis(300)),
        )
        .unwrap();

    sleep(Duration::from_millis(150));
    assert!(cache.read("a", None).unwrap().is_some());
    sleep(Duration::from_millis(250));
    assert!(cache.read("a", None).unwrap().is_none());
}

// == Eviction ==

#[test]
fn test_trim_follows_deadline_order_not_insertion_order() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let now = Utc::now();

    // Increasing payload sizes; key4 is written last but expires first
    let deadlines = [
        ("key1", now + chrono::Duration::hours(2)),
        ("key2", now + chrono::Duration::hours(3)),
        ("key3", now + chrono::Duration::hours(4)),
        ("key4", now + chrono::Duration::hours(1)),
    ];
    for (i, (key, deadline)) in deadlines.iter().enumerate() {
        let payload = vec![b'p'; 100 * (i + 1)];
        cache
            .write(key, None, payload, &CacheItemPolicy::absolute(*deadline))
            .unwrap();
    }

    let sizes: Vec<u64> = deadlines.iter().map(|(k, _)| file_size(&cache, k)).collect();
    assert!(sizes.windows(2).all(|w| w[0] < w[1]));

    let target = sizes[0] + sizes[1] + sizes[2];
    let remaining = cache.trim_to_size(target, None).unwrap();
    assert_eq!(remaining, target);

    assert!(cache.exists("key1", None).unwrap());
    assert!(cache.exists("key2", None).unwrap());
    assert!(cache.exists("key3", None).unwrap());
    assert!(!cache.exists("key4", None).unwrap());
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_ceiling_triggers_trim_and_event() {
    let dir = TempDir::new().unwrap();
    let now = Utc::now();
    let policy_for = |i: i64| CacheItemPolicy::absolute(now + chrono::Duration::minutes(10 + i));

    // Same-length keys and deadlines sharing `now` keep every file the same size
    let probe = open_cache(&dir);
    probe.write("k0", None, vec![0u8; 200], &policy_for(0)).unwrap();
    let entry_size = probe.current_size();
    probe.remove("k0", None).unwrap();

    let mut config = CacheConfig::new(dir.path());
    config.max_cache_size = Some(entry_size * 4);
    let cache = FileCache::open(config).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    cache.subscribe(move |event| sink.lock().unwrap().push(*event));

    for i in 0..5 {
        let key = format!("k{}", i);
        cache
            .write(&key, None, vec![0u8; 200], &policy_for(i))
            .unwrap();
    }

    // Trimmed down to 75% of the ceiling: three of five entries remain
    assert_eq!(cache.current_size(), entry_size * 3);
    assert_eq!(cache.count(None).unwrap(), 3);
    assert!(!cache.exists("k0", None).unwrap());
    assert!(!cache.exists("k1", None).unwrap());
    assert!(cache.exists("k4", None).unwrap());

    let events = events.lock().unwrap();
    assert!(matches!(
        events[0],
        CacheEvent::CeilingReached { max_size, .. } if max_size == entry_size * 4
    ));
    assert!(matches!(
        events[1],
        CacheEvent::Resized { new_size, .. } if new_size == entry_size * 3
    ));
}

#[test]
fn test_never_expiring_entries_trimmed_last() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);

    cache
        .write("forever", None, vec![1; 64], &CacheItemPolicy::never())
        .unwrap();
    cache
        .write(
            "soon",
            None,
            vec![1; 64],
            &CacheItemPolicy::expires_in(Duration::from_secs(3600)),
        )
        .unwrap();

    let keep = file_size(&cache, "forever");
    cache.trim_to_size(keep, None).unwrap();
    assert!(cache.exists("forever", None).unwrap());
    assert!(!cache.exists("soon", None).unwrap());
}

// == Persistence ==

#[test]
fn test_entries_persist_across_instances() {
    let dir = TempDir::new().unwrap();
    {
        let cache = open_cache(&dir);
        cache
            .write("user:1", Some("users"), b"alice".to_vec(), &CacheItemPolicy::never())
            .unwrap();
        cache
            .write("config", None, b"{}".to_vec(), &CacheItemPolicy::never())
            .unwrap();
    }

    let mut config = CacheConfig::new(dir.path());
    config.eager_size_calculation = true;
    let reopened = FileCache::open(config).unwrap();

    let entry = reopened.read("user:1", Some("users")).unwrap().unwrap();
    assert_eq!(entry.payload, Some(b"alice".to_vec()));
    assert!(reopened.read("user:1", None).unwrap().is_none());

    let on_disk = file_size(&reopened, "config")
        + fs::metadata(reopened.entry_path("user:1", Some("users")))
            .unwrap()
            .len();
    assert_eq!(reopened.current_size(), on_disk);
    assert_eq!(reopened.cache_size(None).unwrap(), on_disk);
}

#[test]
fn test_lazy_instance_starts_at_zero() {
    let dir = TempDir::new().unwrap();
    open_cache(&dir)
        .write("k", None, b"v".to_vec(), &CacheItemPolicy::never())
        .unwrap();

    let reopened = open_cache(&dir);
    assert_eq!(reopened.current_size(), 0);
    assert!(reopened.recompute_size().unwrap() > 0);
}

// == Concurrency ==

#[test]
fn test_concurrent_writers_leave_one_whole_entry() {
    let dir = TempDir::new().unwrap();
    let first = Arc::new(open_cache(&dir));
    let second = Arc::new(open_cache(&dir));
    const LEN: usize = 256 * 1024;

    let writers: Vec<_> = [(first, b'a'), (second, b'b')]
        .into_iter()
        .map(|(cache, byte)| {
            thread::spawn(move || {
                for _ in 0..10 {
                    cache
                        .write("shared", None, vec![byte; LEN], &CacheItemPolicy::never())
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let reader = open_cache(&dir);
    let payload = reader.read("shared", None).unwrap().unwrap().payload.unwrap();
    assert_eq!(payload.len(), LEN);
    assert!(payload.iter().all(|b| *b == payload[0]));
    assert!(payload[0] == b'a' || payload[0] == b'b');
}

#[test]
fn test_lock_timeout_propagates() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::new(dir.path());
    config.access_timeout = Duration::from_millis(100);
    let cache = FileCache::open(config).unwrap();
    cache
        .write("held", None, b"v".to_vec(), &CacheItemPolicy::never())
        .unwrap();

    let holder = FileAccess::new(Duration::ZERO);
    let _lock = holder
        .open(&cache.entry_path("held", None), AccessMode::Modify)
        .unwrap()
        .unwrap();

    let err = cache.read("held", None).unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        cache.write("held", None, b"w".to_vec(), &CacheItemPolicy::never()),
        Err(CacheError::AccessTimeout { .. })
    ));
    assert!(matches!(
        cache.remove("held", None),
        Err(CacheError::AccessTimeout { .. })
    ));
    assert!(matches!(
        cache.trim_to_size(0, None),
        Err(CacheError::AccessTimeout { .. })
    ));
}

// == Validation ==

#[test]
fn test_invalid_policy_has_no_effect() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let policy = CacheItemPolicy {
        absolute_expiration: Some(Utc::now() + chrono::Duration::hours(1)),
        sliding_expiration: Some(chrono::Duration::minutes(5)),
        ..CacheItemPolicy::default()
    };

    assert!(matches!(
        cache.write("k", None, b"v".to_vec(), &policy),
        Err(CacheError::InvalidPolicy(_))
    ));
    assert!(!cache.exists("k", None).unwrap());
    assert_eq!(cache.count(None).unwrap(), 0);
}

#[test]
fn test_flush_removes_only_expired() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let past = Utc::now() - chrono::Duration::minutes(1);

    cache
        .write("old", Some("r"), b"1".to_vec(), &CacheItemPolicy::absolute(past))
        .unwrap();
    cache
        .write("new", Some("r"), b"2".to_vec(), &CacheItemPolicy::never())
        .unwrap();

    let removed = cache.flush(Some("r")).unwrap();
    assert!(removed > 0);
    assert_eq!(cache.keys(Some("r")).unwrap(), vec!["new".to_string()]);
}
