//! # Core Protocol Components
//!
//! The packet model, frame codec and envelope serialization.
//!
//! ## Components
//! - **Packet**: the envelope the eight layers annotate, plus field-vector math
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Serialization**: JSON / MessagePack envelopes with a format byte
//! - **Hex bytes**: serde adapters writing byte fields as hex in JSON
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Flags(1)] [Length(4)] [Body(N)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 16MB (prevents memory exhaustion)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod hex_bytes;
pub mod packet;
pub mod serialization;
