//! # Frame Codec
//!
//! Tokio codec that splits a byte stream into frames.
//!
//! ## Wire Format
//! ```text
//! [Magic(4) "LUMI"] [Version(1)] [Flags(1)] [Length(4, big endian)] [Body(N)]
//! ```
//!
//! Flag bit 0 marks a compressed body; bit 1 selects Zstd over LZ4. The codec
//! only frames bytes; envelope encoding and compression live in
//! [`crate::protocol::message`].
//!
//! ## Recovery
//! A stream that loses framing (bad magic) is resynchronised by skipping to
//! the next magic sequence. A frame of another protocol version is skipped
//! whole. Both are logged and dropped without ending the stream. A length above
//! the frame limit is the only fatal condition: the stream is no longer
//! trustworthy.

use crate::config::{MAGIC_BYTES, MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 10;

/// Body is compressed
pub const FLAG_COMPRESSED: u8 = 0x01;
/// Compressed with Zstd rather than LZ4
pub const FLAG_ZSTD: u8 = 0x02;

/// One framed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub flags: u8,
    pub body: Bytes,
}

impl Frame {
    pub fn new(flags: u8, body: impl Into<Bytes>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags,
            body: body.into(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Serialize header and body into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.body.len());
        out.extend_from_slice(&MAGIC_BYTES);
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Strict parse of exactly one frame.
    ///
    /// # Errors
    /// `InvalidHeader` for a short buffer, bad magic or a length that does not
    /// match the buffer; `UnsupportedVersion`; `OversizedPacket`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE || data[0..4] != MAGIC_BYTES {
            return Err(ProtocolError::InvalidHeader);
        }
        let version = data[4];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let length = u32::from_be_bytes([data[6], data[7], data[8], data[9]]) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::OversizedPacket(length));
        }
        if data.len() != HEADER_SIZE + length {
            return Err(ProtocolError::InvalidHeader);
        }
        Ok(Self {
            version,
            flags: data[5],
            body: Bytes::copy_from_slice(&data[HEADER_SIZE..]),
        })
    }
}

/// Length-prefixed frame codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

/// Offset of the next possible magic start after position 0, or the point
/// from which a partial magic prefix may still be completed.
fn resync_offset(src: &[u8]) -> usize {
    (1..src.len())
        .find(|&i| {
            let tail = &src[i..];
            let n = tail.len().min(MAGIC_BYTES.len());
            tail[..n] == MAGIC_BYTES[..n]
        })
        .unwrap_or(src.len())
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            if src[0..4] != MAGIC_BYTES {
                let skip = resync_offset(src);
                warn!(skipped = skip, "Lost frame sync, discarding bytes");
                src.advance(skip);
                continue;
            }

            let version = src[4];
            let flags = src[5];
            let length = u32::from_be_bytes([src[6], src[7], src[8], src[9]]) as usize;

            if length > self.max_frame_size {
                return Err(ProtocolError::OversizedPacket(length));
            }

            let total = HEADER_SIZE + length;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            // Zero-copy split of the whole frame off the buffer
            let mut frame = src.split_to(total);
            if version != PROTOCOL_VERSION {
                warn!(version, length, "Skipping frame with unsupported protocol version");
                continue;
            }
            frame.advance(HEADER_SIZE);
            return Ok(Some(Frame {
                version,
                flags,
                body: frame.freeze(),
            }));
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.body.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(item.body.len()));
        }
        dst.reserve(HEADER_SIZE + item.body.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(item.version);
        dst.put_u8(item.flags);
        dst.put_u32(item.body.len() as u32);
        dst.put_slice(&item.body);
        Ok(())
    }
}
