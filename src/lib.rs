//! File Cache - a disk-resident key/value cache
//!
//! Entries live one per file below a root directory, carry absolute or
//! sliding expiration, and are evicted soonest-deadline-first when the cache
//! outgrows its ceiling. Any number of processes may share a root; per-file
//! advisory locks keep each entry consistent.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;

pub use api::{IndexedCache, ObjectCache};
pub use cache::{
    CacheEntry, CacheEvent, CacheItemPolicy, CachePriority, ExpirationPolicy, FileCache,
    StatsSnapshot,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
