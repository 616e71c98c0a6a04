//! Codec Module
//!
//! Pluggable serialization of [`CacheEntry`] values to the bytes stored in an
//! entry file.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, ExpirationPolicy};
use crate::error::CodecError;

/// Layout version written by [`BincodeCodec`].
pub const FORMAT_VERSION: u8 = 1;

// == Codec Trait ==
/// Turns entries into bytes and back.
pub trait Codec: Send + Sync {
    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry, CodecError>;
}

// == Wire Layout ==
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u8,
    key: &'a str,
    policy: &'a ExpirationPolicy,
    payload: Option<&'a [u8]>,
}

#[derive(Deserialize)]
struct Envelope {
    version: u8,
    key: String,
    policy: ExpirationPolicy,
    payload: Option<Vec<u8>>,
}

// == Bincode Codec ==
/// Default codec: a versioned bincode envelope of key, policy and payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>, CodecError> {
        let envelope = EnvelopeRef {
            version: FORMAT_VERSION,
            key: &entry.key,
            policy: &entry.policy,
            payload: entry.payload.as_deref(),
        };
        bincode::serialize(&envelope).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Decode("empty entry file".to_string()));
        }

        let envelope: Envelope =
            bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;

        if envelope.version != FORMAT_VERSION {
            return Err(CodecError::Decode(format!(
                "unsupported entry format version {}",
                envelope.version
            )));
        }

        Ok(CacheEntry {
            key: envelope.key,
            payload: envelope.payload,
            policy: envelope.policy,
        })
    }
}
