//! Messages exchanged between luminous nodes and the covenant router.
//!
//! Each message travels as one frame: the body is a format-tagged envelope
//! (see [`MultiFormat`]), optionally compressed.

use crate::config::TransportConfig;
use crate::core::codec::{Frame, FLAG_COMPRESSED, FLAG_ZSTD};
use crate::core::packet::Packet;
use crate::core::serialization::MultiFormat;
use crate::error::Result;
use crate::utils::compression::{self, CompressionKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Optional first message from a client, naming its peer id
    Hello { node_id: String },

    /// A packet moving through the network
    Packet(Box<Packet>),

    /// Periodic field state broadcast by the router
    Harmonization {
        router_id: String,
        field_coherence: f64,
        router_coherence: f64,
        peer_count: usize,
        timestamp: u64,
    },

    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
}

impl MultiFormat for Message {}

impl Message {
    pub fn packet(packet: Packet) -> Self {
        Message::Packet(Box::new(packet))
    }

    /// Short static name for logs.
    #[inline]
    pub fn opcode(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::Packet(_) => "PACKET",
            Message::Harmonization { .. } => "HARMONIZATION",
            Message::Ping { .. } => "PING",
            Message::Pong { .. } => "PONG",
        }
    }

    /// Serialize into a frame using the transport's format and compression
    /// settings.
    pub fn to_frame(&self, config: &TransportConfig) -> Result<Frame> {
        let envelope = self.serialize_with_header(config.format)?;
        if !config.compression_enabled {
            return Ok(Frame::new(0, envelope));
        }
        let (body, compressed) = compression::maybe_compress(
            &envelope,
            config.compression,
            config.compression_threshold_bytes,
        )?;
        let mut flags = 0;
        if compressed {
            flags |= FLAG_COMPRESSED;
            if config.compression == CompressionKind::Zstd {
                flags |= FLAG_ZSTD;
            }
        }
        Ok(Frame::new(flags, body))
    }

    /// Inverse of [`Message::to_frame`]. The frame itself says whether and how
    /// the body was compressed and which envelope format it uses.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let kind = if frame.flags & FLAG_ZSTD != 0 {
            CompressionKind::Zstd
        } else {
            CompressionKind::Lz4
        };
        let envelope = compression::maybe_decompress(&frame.body, kind, frame.is_compressed())?;
        let (message, _) = Self::deserialize_with_header(&envelope)?;
        Ok(message)
    }
}
