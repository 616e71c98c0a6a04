//! Index-Style Access
//!
//! Wraps any [`ObjectCache`] with a default region and a default policy, for
//! callers that address entries by key alone.

use chrono::Utc;

use crate::api::ObjectCache;
use crate::cache::{CacheItemPolicy, FileCache};
use crate::config::CacheConfig;
use crate::error::Result;

#[derive(Debug)]
pub struct IndexedCache<C> {
    cache: C,
    default_region: Option<String>,
    default_policy: CacheItemPolicy,
}

impl<C: ObjectCache> IndexedCache<C> {
    /// Wraps `cache`; entries never expire until a default policy is set.
    pub fn new(cache: C, default_region: Option<String>) -> Self {
        Self {
            cache,
            default_region,
            default_policy: CacheItemPolicy::never(),
        }
    }

    pub fn inner(&self) -> &C {
        &self.cache
    }

    pub fn default_region(&self) -> Option<&str> {
        self.default_region.as_deref()
    }

    pub fn set_default_region(&mut self, region: Option<String>) {
        self.default_region = region;
    }

    pub fn default_policy(&self) -> &CacheItemPolicy {
        &self.default_policy
    }

    /// Replaces the default policy after validating it.
    pub fn set_default_policy(&mut self, policy: CacheItemPolicy) -> Result<()> {
        policy.validate(Utc::now())?;
        self.default_policy = policy;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.cache.get(key, self.default_region())
    }

    pub fn set(&self, key: &str, payload: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.cache
            .set(key, payload, &self.default_policy, self.default_region())
    }

    pub fn remove(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.cache.remove(key, self.default_region())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.cache.contains(key, self.default_region())
    }
}

impl IndexedCache<FileCache> {
    /// Opens a file cache whose default region comes from `config`.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let default_region = config.default_region.clone();
        Ok(Self::new(FileCache::open(config)?, default_region))
    }
}
