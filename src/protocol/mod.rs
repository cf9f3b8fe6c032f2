//! # Protocol Messages
//!
//! The message vocabulary spoken over a connection: an optional `Hello`,
//! packets, router harmonization broadcasts, and ping/pong keepalives.

pub mod message;

pub use message::Message;
