//! # Transport Layer
//!
//! Byte-stream transport between luminous nodes and the covenant router.
//!
//! ## Components
//! - **TCP**: framed server with graceful shutdown, and the node-side client
//!
//! The router itself never sees sockets: each accepted connection is handed to
//! it as a [`crate::router::PeerConnection`] backed by a writer task.

pub mod tcp;

pub use tcp::{start_server, start_server_with_shutdown, NodeClient};
