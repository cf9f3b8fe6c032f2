//! Shared helpers for the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use luminous_stack::config::StackConfig;
use luminous_stack::core::packet::{Intention, Packet};
use luminous_stack::error::Result;
use luminous_stack::protocol::Message;
use luminous_stack::router::PeerConnection;
use luminous_stack::stack::{SendOptions, Stack};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Connection that keeps every message sent to it.
#[derive(Debug, Default)]
pub struct RecordingPeer {
    sent: Mutex<Vec<Message>>,
    closed: AtomicBool,
}

impl RecordingPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// Packets received, excluding the router's welcome.
    pub fn packets(&self) -> Vec<Packet> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::Packet(p) if p.payload["type"] != "router-welcome" => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PeerConnection for RecordingPeer {
    fn is_open(&self) -> bool {
        !self.is_closed()
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn stack_with_field(field: u8, coherence: f64) -> Stack {
    let config = StackConfig {
        coherence_level: coherence,
        ..StackConfig::default()
    };
    Stack::with_field_vector(&config, vec![field; 16])
}

pub async fn outgoing(stack: &mut Stack, payload: Value, intention: Intention) -> Packet {
    stack.send(payload, SendOptions::with_intention(intention)).await
}
