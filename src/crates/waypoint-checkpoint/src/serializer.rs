//! Serialization protocol for persisted checkpoints
//!
//! Durable savers store checkpoints, metadata and pending writes as opaque
//! blobs. The [`SerializerProtocol`] decides how those blobs are encoded.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Checkpoint values are arbitrary `serde_json::Value` trees, so the format
/// must be self-describing.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;

    /// Serialize to a JSON value
    fn dumps_json<T: Serialize>(&self, value: &T) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Deserialize from a JSON value
    fn loads_json<T: for<'de> Deserialize<'de>>(&self, value: &serde_json::Value) -> Result<T> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
