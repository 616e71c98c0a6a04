//! Policy Module
//!
//! Caller-facing expiration policy and its validation into the persisted
//! [`ExpirationPolicy`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::ExpirationPolicy;
use crate::error::{CacheError, Result};

/// Callback invoked with the key of an affected entry.
pub type EntryCallback = Arc<dyn Fn(&str) + Send + Sync>;

// == Cache Priority ==
/// Eviction priority hint. Only `Default` is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePriority {
    #[default]
    Default,
    NotRemovable,
}

// == Cache Item Policy ==
/// Expiration policy as requested by a caller.
///
/// Leaving both `absolute_expiration` and `sliding_expiration` unset means
/// the entry never expires. A zero sliding window counts as unset.
#[derive(Clone, Default)]
pub struct CacheItemPolicy {
    pub absolute_expiration: Option<DateTime<Utc>>,
    pub sliding_expiration: Option<chrono::Duration>,
    pub priority: CachePriority,
    pub change_monitors: Vec<PathBuf>,
    pub on_removed: Option<EntryCallback>,
    pub on_updated: Option<EntryCallback>,
}

impl CacheItemPolicy {
    /// Policy that never expires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Expires at a fixed instant.
    pub fn absolute(at: DateTime<Utc>) -> Self {
        Self {
            absolute_expiration: Some(at),
            ..Self::default()
        }
    }

    /// Expires `ttl` from now.
    pub fn expires_in(ttl: Duration) -> Self {
        Self::absolute(crate::cache::entry::deadline_after(Utc::now(), ttl))
    }

    /// Expires once it has not been read for `window`.
    pub fn sliding(window: Duration) -> Self {
        Self {
            sliding_expiration: Some(
                chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            ),
            ..Self::default()
        }
    }

    // == Validate ==
    /// Checks the policy and converts it to its persisted form.
    ///
    /// Fails before any I/O takes place; no partial effect is possible.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<ExpirationPolicy> {
        let sliding = match self.sliding_expiration {
            Some(window) if window < chrono::Duration::zero() => {
                return Err(CacheError::InvalidPolicy(format!(
                    "sliding expiration can not be negative (got {window})"
                )));
            }
            Some(window) if window > chrono::Duration::zero() => window.to_std().ok(),
            _ => None,
        };

        if self.absolute_expiration.is_some() && sliding.is_some() {
            return Err(CacheError::InvalidPolicy(
                "policy can not have absolute and sliding expiration set at the same time"
                    .to_string(),
            ));
        }

        if !self.change_monitors.is_empty() {
            return Err(CacheError::UnsupportedCapability(
                "change monitors are not supported".to_string(),
            ));
        }

        if self.on_removed.is_some() || self.on_updated.is_some() {
            return Err(CacheError::UnsupportedCapability(
                "remove and update callbacks are not supported".to_string(),
            ));
        }

        if self.priority != CachePriority::Default {
            return Err(CacheError::UnsupportedCapability(format!(
                "priority {:?} is not supported",
                self.priority
            )));
        }

        Ok(match (self.absolute_expiration, sliding) {
            (Some(at), _) => ExpirationPolicy::Absolute(at),
            (None, Some(window)) => ExpirationPolicy::sliding_from(window, now),
            (None, None) => ExpirationPolicy::Never,
        })
    }
}

impl fmt::Debug for CacheItemPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheItemPolicy")
            .field("absolute_expiration", &self.absolute_expiration)
            .field("sliding_expiration", &self.sliding_expiration)
            .field("priority", &self.priority)
            .field("change_monitors", &self.change_monitors)
            .field("on_removed", &self.on_removed.is_some())
            .field("on_updated", &self.on_updated.is_some())
            .finish()
    }
}

impl From<ExpirationPolicy> for CacheItemPolicy {
    /// Re-expresses a stored policy as a request, e.g. to copy an entry.
    fn from(policy: ExpirationPolicy) -> Self {
        match policy {
            ExpirationPolicy::Never => Self::never(),
            ExpirationPolicy::Absolute(at) => Self::absolute(at),
            ExpirationPolicy::Sliding { window, .. } => Self::sliding(window),
        }
    }
}
