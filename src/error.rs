//! # Error Types
//!
//! Error handling for the luminous stack and the covenant router.
//!
//! This module defines every error variant that can surface from the
//! pipeline, the wire codec, configuration loading, and the transport.
//!
//! ## Error Categories
//! - **Pipeline Errors**: a packet rejected by a receiving layer (origin, field)
//! - **Wire Errors**: invalid frame header, oversized frames, bad envelopes
//! - **Compression Errors**: decompression failures and size limit violations
//! - **Transport Errors**: I/O, closed connections, timeouts
//! - **Configuration Errors**: unreadable or invalid configuration
//!
//! Soft pipeline conditions (low coherence, resonance repair, rejected session
//! invitations) are never errors; they are recorded as packet annotations.
//! A routing miss is not an error either; the router answers the sender with a
//! returned-to-sender packet.
//!
//! ## Example Usage
//! ```rust
//! use luminous_stack::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn check_threshold(value: f64) -> Result<f64> {
//!     if !(0.0..=1.0).contains(&value) {
//!         return Err(ProtocolError::ConfigError(format!("threshold out of range: {value}")));
//!     }
//!     Ok(value)
//! }
//!
//! match check_threshold(0.3) {
//!     Ok(v) => info!(threshold = v, "threshold accepted"),
//!     Err(e) => error!(error = %e, "threshold rejected"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Pipeline errors
    pub const ERR_MISSING_ORIGIN: &str = "origin signature missing";
    pub const ERR_ORIGIN_LENGTH: &str = "origin signature has the wrong length";

    /// Wire validation errors
    pub const ERR_INVALID_HEADER: &str = "Invalid frame header";
    pub const ERR_EMPTY_ENVELOPE: &str = "Empty envelope";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_WRITER_GONE: &str = "Connection writer task has stopped";

    /// Synchronization errors
    pub const ERR_REGISTRY_LOCK: &str = "Peer registry lock poisoned";
    pub const ERR_OBSERVER_LOCK: &str = "Observer list lock poisoned";

    /// Time errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
}

/// Primary error type for all stack, router and transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    /// The origin layer refused the packet: no signature, or one of the wrong size.
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// The field layer refused the packet: the sender's field vector is too far
    /// from the receiver's own.
    #[error("Field dissonance: compatibility {compatibility:.3} below threshold {threshold:.3}")]
    FieldDissonance { compatibility: f64, threshold: f64 },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error rejects a single packet while leaving the stack usable.
    pub fn is_packet_rejection(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidOrigin(_) | ProtocolError::FieldDissonance { .. }
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
