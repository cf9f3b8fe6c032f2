//! Frame body compression.
//!
//! Bodies above the configured threshold are compressed before framing when
//! the transport enables it; the frame's flag byte records whether the body
//! must be inflated on the way in.

use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    Lz4,
    Zstd,
}

/// Maximum output size for decompression, aligned with the frame limit
const MAX_DECOMPRESSION_SIZE: usize = MAX_FRAME_SIZE;

/// Shannon entropy threshold (bits per byte) above which compression is skipped
const MIN_ENTROPY_THRESHOLD: f64 = 4.0;

/// Shannon entropy of `data` in bits per byte (0.0 - 8.0)
fn calculate_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Envelopes are JSON or MessagePack, so low entropy is the common case; the
/// check only rules out bodies that are already dense (hex-heavy digests are not).
fn should_compress(data: &[u8], threshold_bytes: usize) -> bool {
    if data.len() < threshold_bytes {
        return false;
    }
    if data.len() < 1024 {
        return true;
    }
    let sample = &data[..data.len().min(512)];
    calculate_entropy(sample) < MIN_ENTROPY_THRESHOLD
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, 1)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses data, refusing outputs larger than the frame limit.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if the input is malformed or
/// inflates past `MAX_DECOMPRESSION_SIZE`
pub fn decompress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => {
            // lz4_flex prepends the uncompressed size as 4 little-endian bytes;
            // reject oversized claims before it allocates
            let header: [u8; 4] = data
                .get(..4)
                .and_then(|h| h.try_into().ok())
                .ok_or(ProtocolError::DecompressionFailure)?;
            if u32::from_le_bytes(header) as usize > MAX_DECOMPRESSION_SIZE {
                return Err(ProtocolError::DecompressionFailure);
            }

            lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)
        }
        CompressionKind::Zstd => {
            use std::io::Read;

            let mut reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            let mut out = Vec::new();
            let mut buffer = [0u8; 8192];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        out.extend_from_slice(&buffer[..n]);
                        if out.len() > MAX_DECOMPRESSION_SIZE {
                            return Err(ProtocolError::DecompressionFailure);
                        }
                    }
                    Err(_) => return Err(ProtocolError::DecompressionFailure),
                }
            }
            Ok(out)
        }
    }
}

/// Compress when the body is large and compressible enough, keeping the
/// compressed form only when it is actually smaller.
///
/// Returns the output bytes and whether compression was applied.
pub fn maybe_compress(
    data: &[u8],
    kind: CompressionKind,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if !should_compress(data, threshold_bytes) {
        return Ok((data.to_vec(), false));
    }
    let compressed = compress(data, kind)?;
    if compressed.len() < data.len() {
        Ok((compressed, true))
    } else {
        Ok((data.to_vec(), false))
    }
}

/// Inverse of [`maybe_compress`].
pub fn maybe_decompress(data: &[u8], kind: CompressionKind, was_compressed: bool) -> Result<Vec<u8>> {
    if was_compressed {
        decompress(data, kind)
    } else {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_zstd_compression_roundtrip() {
        let original = br#"{"type":"packet","payload":"hello hello hello hello"}"#;
        let compressed = compress(original, CompressionKind::Zstd).unwrap();
        let decompressed = decompress(&compressed, CompressionKind::Zstd).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn test_lz4_oversized_claim_rejected() {
        let claimed_size = (MAX_DECOMPRESSION_SIZE + 1) as u32;
        let mut malicious = claimed_size.to_le_bytes().to_vec();
        malicious.extend_from_slice(&[0u8; 16]);

        assert!(decompress(&malicious, CompressionKind::Lz4).is_err());
    }

    #[test]
    fn test_lz4_short_input_rejected() {
        assert!(decompress(&[0x2b, 0x60], CompressionKind::Lz4).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_small_body_left_alone() {
        let (out, compressed) = maybe_compress(b"tiny", CompressionKind::Lz4, 512).unwrap();
        assert!(!compressed);
        assert_eq!(out, b"tiny");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_repetitive_body_compressed() {
        let body = "{\"coherence\":0.5}".repeat(200).into_bytes();
        let (out, compressed) = maybe_compress(&body, CompressionKind::Lz4, 512).unwrap();
        assert!(compressed);
        assert!(out.len() < body.len());
        let back = maybe_decompress(&out, CompressionKind::Lz4, compressed).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn test_entropy_bounds() {
        assert!(calculate_entropy(&[0u8; 100]) < 0.1);
        let spread: Vec<u8> = (0..=255).cycle().take(1024).collect();
        assert!(calculate_entropy(&spread) > 7.0);
    }
}
