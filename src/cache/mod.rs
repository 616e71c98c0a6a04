//! Cache Module
//!
//! Disk-resident entry storage with absolute/sliding expiration and
//! size-bounded eviction.

mod codec;
mod entry;
mod events;
mod eviction;
mod locked_file;
mod paths;
mod policy;
mod size;
mod stats;
mod store;


use std::time::Duration;

// Re-export public types
pub use codec::{BincodeCodec, Codec, FORMAT_VERSION};
pub use entry::{CacheEntry, ExpirationPolicy};
pub use events::CacheEvent;
pub use locked_file::{AccessMode, FileAccess, LockedFile};
pub use paths::{stable_hash, KeyPathMapper};
pub use policy::{CacheItemPolicy, CachePriority, EntryCallback};
pub use size::{directory_size, SizeAccountant};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::FileCache;

// == Public Constants ==
/// Directory name of the default region, and prefix of named region buckets
pub const REGION_BUCKET_PREFIX: &str = "_";

/// Hex characters of the key hash used as the shard directory name
pub const SHARD_PREFIX_LEN: usize = 2;

/// Pause between attempts to lock a contended entry file
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on how far a sliding deadline may lag before a read rewrites it
pub const MAX_REFRESH_THRESHOLD: Duration = Duration::from_secs(1);

/// Fraction of the ceiling that an automatic trim shrinks the cache to
pub const TRIM_HEADROOM_PERCENT: u64 = 75;
