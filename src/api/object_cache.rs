//! Object Cache Interface
//!
//! Abstract key/payload cache operations. [`FileCache`] implements them by
//! delegating to its own methods; the engine does not depend on this trait.

use crate::cache::{CacheEvent, CacheItemPolicy, ExpirationPolicy, FileCache};
use crate::error::Result;

/// Listener for [`CacheEvent`]s.
pub type EventListener = Box<dyn Fn(&CacheEvent) + Send + Sync>;

// == Object Cache ==
pub trait ObjectCache: Send + Sync {
    /// Identifier of this cache instance.
    fn name(&self) -> &str;

    /// Live payload for `key`, or `None`.
    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<Vec<u8>>>;

    /// Stores `payload`, returning the previous live payload.
    fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        policy: &CacheItemPolicy,
        region: Option<&str>,
    ) -> Result<Option<Vec<u8>>>;

    /// Deletes `key`, returning its live payload.
    fn remove(&self, key: &str, region: Option<&str>) -> Result<Option<Vec<u8>>>;

    /// Presence check; expired entries count until something reads them.
    fn contains(&self, key: &str, region: Option<&str>) -> Result<bool>;

    fn policy_of(&self, key: &str, region: Option<&str>) -> Result<Option<ExpirationPolicy>>;

    /// Shrinks the scope to at most `target` bytes, returning the size left.
    fn trim(&self, target: u64, region: Option<&str>) -> Result<u64>;

    fn count(&self, region: Option<&str>) -> Result<u64>;

    fn subscribe(&self, listener: EventListener);

    /// Payloads for several keys of one region.
    fn get_values(
        &self,
        keys: &[&str],
        region: Option<&str>,
    ) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        keys.iter()
            .map(|key| Ok((key.to_string(), self.get(key, region)?)))
            .collect()
    }
}

impl ObjectCache for FileCache {
    fn name(&self) -> &str {
        FileCache::name(self)
    }

    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<Vec<u8>>> {
        Ok(self.read(key, region)?.and_then(|entry| entry.payload))
    }

    fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        policy: &CacheItemPolicy,
        region: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        self.write(key, region, payload, policy)
    }

    fn remove(&self, key: &str, region: Option<&str>) -> Result<Option<Vec<u8>>> {
        FileCache::remove(self, key, region)
    }

    fn contains(&self, key: &str, region: Option<&str>) -> Result<bool> {
        self.exists(key, region)
    }

    fn policy_of(&self, key: &str, region: Option<&str>) -> Result<Option<ExpirationPolicy>> {
        FileCache::policy_of(self, key, region)
    }

    fn trim(&self, target: u64, region: Option<&str>) -> Result<u64> {
        self.trim_to_size(target, region)
    }

    fn count(&self, region: Option<&str>) -> Result<u64> {
        FileCache::count(self, region)
    }

    fn subscribe(&self, listener: EventListener) {
        FileCache::subscribe(self, listener);
    }
}
