//! Response records printed by the CLI
//!
//! Payloads are opaque bytes; they are rendered as UTF-8 with invalid
//! sequences replaced.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::ExpirationPolicy;

/// Payload bytes as printable text.
fn payload_text(payload: Option<Vec<u8>>) -> Option<String> {
    payload.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Output of `get`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub region: Option<String>,
    pub found: bool,
    pub value: Option<String>,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, region: Option<&str>, payload: Option<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            region: region.map(str::to_string),
            found: payload.is_some(),
            value: payload_text(payload),
        }
    }
}

/// Output of `set`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub key: String,
    pub region: Option<String>,
    /// Live value the write replaced
    pub previous: Option<String>,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, region: Option<&str>, previous: Option<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            region: region.map(str::to_string),
            previous: payload_text(previous),
        }
    }
}

/// Output of `remove`
#[derive(Debug, Clone, Serialize)]
pub struct RemoveResponse {
    pub key: String,
    pub removed: bool,
    pub previous: Option<String>,
}

impl RemoveResponse {
    pub fn new(key: impl Into<String>, previous: Option<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            removed: previous.is_some(),
            previous: payload_text(previous),
        }
    }
}

/// Output of `exists`
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Output of `keys`
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub region: Option<String>,
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    pub fn new(region: Option<&str>, keys: Vec<String>) -> Self {
        Self {
            region: region.map(str::to_string),
            count: keys.len(),
            keys,
        }
    }
}

/// Output of `count`
#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub region: Option<String>,
    pub count: u64,
}

/// Output of `policy`
#[derive(Debug, Clone, Serialize)]
pub struct PolicyResponse {
    pub key: String,
    pub policy: Option<ExpirationPolicy>,
    /// Effective deadline, absent for missing or never-expiring entries
    pub expires_at: Option<String>,
}

impl PolicyResponse {
    pub fn new(key: impl Into<String>, policy: Option<ExpirationPolicy>) -> Self {
        let expires_at = policy
            .as_ref()
            .and_then(ExpirationPolicy::deadline)
            .map(|deadline| deadline.to_rfc3339());
        Self {
            key: key.into(),
            policy,
            expires_at,
        }
    }
}

/// Output of `flush`
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub region: Option<String>,
    pub before: String,
    pub bytes_removed: u64,
}

impl FlushResponse {
    pub fn new(region: Option<&str>, before: DateTime<Utc>, bytes_removed: u64) -> Self {
        Self {
            region: region.map(str::to_string),
            before: before.to_rfc3339(),
            bytes_removed,
        }
    }
}

/// Output of `trim`
#[derive(Debug, Clone, Serialize)]
pub struct TrimResponse {
    pub region: Option<String>,
    pub target: u64,
    pub remaining: u64,
}

/// Output of `size`
#[derive(Debug, Clone, Serialize)]
pub struct SizeResponse {
    pub region: Option<String>,
    pub size: u64,
    pub max_size: Option<u64>,
}

/// Error record for any failed command
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
