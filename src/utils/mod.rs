//! # Utility Modules
//!
//! Supporting utilities shared by the stack, the router and the transport.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd with size limits and thresholds for frame bodies
//! - **Digest**: SHA-256 helpers and cryptographically strong random bytes
//! - **Logging**: Structured logging initialisation
//! - **Metrics**: Thread-safe router counters
//! - **Time**: Millisecond timestamps
//!
//! ## Security
//! - Random material comes from the thread-local CSPRNG (`rand::rng`)
//! - Decompression bomb protection (16MB limit)

pub mod compression;
pub mod digest;
pub mod logging;
pub mod metrics;
pub mod time;

pub use metrics::{RouterMetrics, RouterMetricsSnapshot, Timer};
