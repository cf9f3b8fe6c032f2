//! # Luminous Stack
//!
//! An eight-layer packet pipeline carrying coherence and intention alongside
//! every payload, and the covenant router that forwards those packets between
//! nodes by intention.
//!
//! ## Modules
//! - [`stack`]: the per-node pipeline (origin, field, session, intention,
//!   resonance, presence, meaning, embodiment)
//! - [`router`]: peer registry, routing policies and the periodic field ticks
//! - [`transport`]: framed TCP server and node client
//! - [`core`]: packet model, frame codec, envelope formats
//! - [`analyzer`]: headless packet inspection
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics
//!
//! ## Quick Start
//! ```rust,no_run
//! use luminous_stack::config::LuminousConfig;
//! use luminous_stack::router::Router;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> luminous_stack::error::Result<()> {
//!     let config = LuminousConfig::default();
//!     let router = Arc::new(Router::new(config.router.clone(), &config.stack));
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
//!     router.run(config.transport.clone(), shutdown_rx).await
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod router;
pub mod stack;
pub mod transport;
pub mod utils;

pub use crate::core::packet::{Intention, Packet};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::Message;
pub use crate::router::{RouteOutcome, Router};
pub use crate::stack::{SendOptions, Stack};
