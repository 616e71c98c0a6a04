//! Cache Entry Module
//!
//! Defines the persisted unit of the cache: a key, an opaque payload and the
//! expiration policy that governs it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::MAX_REFRESH_THRESHOLD;

// == Expiration Policy ==
/// Expiration policy as stored on disk.
///
/// A sliding policy carries its current effective deadline alongside the
/// window so that readers which do not refresh (trim, flush, `policy_of`)
/// can still order and evaluate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    /// Never expires
    Never,
    /// Dead once the wall clock passes the timestamp
    Absolute(DateTime<Utc>),
    /// Deadline moves to `now + window` on every successful read
    Sliding {
        window: Duration,
        deadline: DateTime<Utc>,
    },
}

impl ExpirationPolicy {
    /// Sliding policy whose first deadline is computed from `now`.
    pub fn sliding_from(window: Duration, now: DateTime<Utc>) -> Self {
        ExpirationPolicy::Sliding {
            window,
            deadline: deadline_after(now, window),
        }
    }

    // == Deadline ==
    /// Effective absolute deadline, `None` meaning infinite.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            ExpirationPolicy::Never => None,
            ExpirationPolicy::Absolute(at) => Some(*at),
            ExpirationPolicy::Sliding { deadline, .. } => Some(*deadline),
        }
    }

    /// Sliding window, if this is a sliding policy.
    pub fn sliding_window(&self) -> Option<Duration> {
        match self {
            ExpirationPolicy::Sliding { window, .. } => Some(*window),
            _ => None,
        }
    }

    // == Is Expired ==
    /// An entry is dead strictly after its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.deadline() {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    // == Refresh ==
    /// Returns the refreshed policy when a read at `now` should rewrite the entry.
    ///
    /// Only sliding policies refresh. Small forward moves of the deadline are
    /// skipped so that hot entries are not rewritten on every read; a deadline
    /// that would move earlier is always written.
    pub fn refreshed_at(&self, now: DateTime<Utc>) -> Option<ExpirationPolicy> {
        let ExpirationPolicy::Sliding { window, deadline } = self else {
            return None;
        };

        let next = deadline_after(now, *window);
        let worth_writing = match (next - *deadline).to_std() {
            Ok(delta) => delta >= refresh_threshold(*window),
            // Negative delta: the new deadline is earlier than the stored one
            Err(_) => true,
        };

        worth_writing.then_some(ExpirationPolicy::Sliding {
            window: *window,
            deadline: next,
        })
    }
}

// == Cache Entry ==
/// Represents a single persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The key as supplied by the caller; the source of truth for identity
    pub key: String,
    /// Opaque payload, `None` for a tombstone
    pub payload: Option<Vec<u8>>,
    /// Expiration policy
    pub policy: ExpirationPolicy,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(key: impl Into<String>, payload: Vec<u8>, policy: ExpirationPolicy) -> Self {
        Self {
            key: key.into(),
            payload: Some(payload),
            policy,
        }
    }

    /// Checks whether the entry is dead at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.policy.is_expired_at(now)
    }
}

// == Utility Functions ==
/// `now + window`, saturating at the largest representable instant.
pub fn deadline_after(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Minimum forward move of a sliding deadline that justifies a rewrite.
///
/// Capped at a tenth of the window so that short windows still refresh on
/// reads spaced well inside the window.
pub fn refresh_threshold(window: Duration) -> Duration {
    (window / 10).min(MAX_REFRESH_THRESHOLD)
}
