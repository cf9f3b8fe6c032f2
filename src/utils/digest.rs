//! SHA-256 and random-byte helpers.
//!
//! Origin signatures, session ids, correlation ids and integrity digests are
//! all derived here so the pipeline has one source of randomness and one hash.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of a SHA-256 digest in bytes
pub const SHA256_LEN: usize = 32;

/// Fill a fixed-size array from the thread-local CSPRNG.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rng().fill_bytes(&mut out);
    out
}

/// Random bytes of arbitrary length.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::rng().fill_bytes(&mut out);
    out
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; SHA256_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derive a signature of `len` bytes from fresh randomness and a timestamp.
///
/// The result is never all-zero: in the astronomically unlikely case the
/// truncated hash is all zeros, the last byte is forced to 1.
pub fn signature(len: usize, timestamp: u64) -> Vec<u8> {
    let seed: [u8; 32] = random_array();
    let hash = sha256_concat(&[&seed, timestamp.to_string().as_bytes()]);
    let mut sig = hash[..len.min(SHA256_LEN)].to_vec();
    if sig.iter().all(|b| *b == 0) {
        if let Some(last) = sig.last_mut() {
            *last = 1;
        }
    }
    sig
}
