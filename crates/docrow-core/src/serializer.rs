//! Pluggable document payload encoding.

use crate::error::{Error, Result};
use crate::schema::DocumentDesign;
use serde_json::Value as JsonValue;

/// Converts documents to and from the stored payload.
pub trait Serializer: Send + Sync {
    /// Encode a document.
    fn serialize(&self, document: &JsonValue) -> Result<Vec<u8>>;

    /// Decode a payload stored for the given design.
    fn deserialize(&self, payload: &[u8], design: &DocumentDesign) -> Result<JsonValue>;
}

/// JSON payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, document: &JsonValue) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(document)?)
    }

    fn deserialize(&self, payload: &[u8], design: &DocumentDesign) -> Result<JsonValue> {
        serde_json::from_slice(payload).map_err(|e| {
            Error::Serialization(format!("{} payload: {e}", design.name()))
        })
    }
}
