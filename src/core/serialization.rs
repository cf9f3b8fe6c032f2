//! # Serialization Formats
//!
//! Envelope encodings for protocol messages. Every envelope on the wire starts
//! with a one-byte format identifier so the receiver can decode it without
//! prior agreement.
//!
//! ## Formats
//! - **JSON** (default): human-readable, byte fields as hex strings
//! - **MessagePack**: compact binary, byte fields as raw byte strings
//!
//! MessagePack is written with named fields (`rmp_serde::to_vec_named`). The
//! packet skips empty annotations when serializing, and a positional encoding
//! would shift every field after a skipped one.
//!
//! ## Usage
//! ```ignore
//! use luminous_stack::core::serialization::{MultiFormat, SerializationFormat};
//!
//! let bytes = message.serialize_with_header(SerializationFormat::MessagePack)?;
//! let (decoded, format) = Message::deserialize_with_header(&bytes)?;
//! ```

use crate::error::constants::ERR_EMPTY_ENVELOPE;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Human-readable JSON format (default, interop)
    #[default]
    Json,
    /// Compact binary format
    MessagePack,
}

impl SerializationFormat {
    /// Get the format identifier byte for wire protocol
    pub fn format_byte(self) -> u8 {
        match self {
            SerializationFormat::Json => 0x02,
            SerializationFormat::MessagePack => 0x03,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(SerializationFormat::Json),
            0x03 => Some(SerializationFormat::MessagePack),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }
}

/// Trait for types that support multiple serialization formats
pub trait MultiFormat: Serialize + for<'de> Deserialize<'de> + Sized {
    /// Serialize to bytes using the specified format
    fn serialize_format(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        match format {
            SerializationFormat::Json => {
                serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => rmp_serde::to_vec_named(self)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
        }
    }

    /// Serialize to bytes with format header
    fn serialize_with_header(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        let mut data = vec![format.format_byte()];
        let mut payload = self.serialize_format(format)?;
        data.append(&mut payload);
        Ok(data)
    }

    /// Deserialize from bytes using the specified format
    fn deserialize_format(data: &[u8], format: SerializationFormat) -> Result<Self> {
        match format {
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }

    /// Deserialize from bytes with format header
    fn deserialize_with_header(data: &[u8]) -> Result<(Self, SerializationFormat)> {
        let (&first, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::DeserializeError(ERR_EMPTY_ENVELOPE.to_string()))?;

        let format = SerializationFormat::from_byte(first).ok_or_else(|| {
            ProtocolError::DeserializeError(format!("Unknown format byte: {first}"))
        })?;

        let value = Self::deserialize_format(rest, format)?;
        Ok((value, format))
    }
}

impl MultiFormat for crate::core::packet::Packet {}
