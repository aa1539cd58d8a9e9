//! Pluggable value codecs.
//!
//! Tier 1 holds typed values; Tiers 2 and 3 hold bytes produced by a codec.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;

/// Converts values to and from the bytes stored in remote tiers.
pub trait Codec: Send + Sync + Clone + Default + fmt::Debug + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Encodes a value.
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CacheError>;

    /// Decodes a value.
    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CacheError>;
}

/// JSON via `serde_json`. Human-readable in `redis-cli` and `psql`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::serialization(e.to_string()))
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::serialization(e.to_string()))
    }
}

/// MessagePack via `rmp-serde`, with field names for schema tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::serialization(e.to_string()))
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CacheError> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::serialization(e.to_string()))
    }
}
