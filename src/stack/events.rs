//! Observer list for stack events.
//!
//! External collaborators register callbacks to watch packets move through
//! the layers. Events are informational only; nothing in the pipeline reads
//! them back for control flow.

use crate::core::packet::{Intention, Packet};
use crate::error::constants::ERR_OBSERVER_LOCK;
use crate::error::{ProtocolError, Result};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Direction of travel through the layer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Layers 7 → 0
    Outgoing,
    /// Layers 0 → 7
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => f.write_str("outgoing"),
            Direction::Incoming => f.write_str("incoming"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StackEvent {
    /// Emitted after every layer call
    LayerProcessed {
        layer: u8,
        name: &'static str,
        direction: Direction,
    },
    /// A session invitation was accepted and recorded
    SessionEstablished { session_id: Vec<u8>, remote_node: String },
    /// The presence layer folded a remote coherence into the local one
    PresenceIntegrated { previous: f64, current: f64 },
    /// The embodiment layer finished a received packet that changed local coherence
    FieldEvolved {
        previous_coherence: f64,
        new_coherence: f64,
        catalyst: Intention,
    },
    PacketSent(Arc<Packet>),
    PacketReceived(Arc<Packet>),
}

impl StackEvent {
    /// Short static name for logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            StackEvent::LayerProcessed { .. } => "layer:processed",
            StackEvent::SessionEstablished { .. } => "session:established",
            StackEvent::PresenceIntegrated { .. } => "presence:integrated",
            StackEvent::FieldEvolved { .. } => "field:evolved",
            StackEvent::PacketSent(_) => "packet:sent",
            StackEvent::PacketReceived(_) => "packet:received",
        }
    }
}

type ObserverFn = dyn Fn(&StackEvent) + Send + Sync + 'static;

/// Registered observers, called synchronously in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Box<ObserverFn>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(&StackEvent) + Send + Sync + 'static,
    {
        let mut observers = self
            .observers
            .write()
            .map_err(|_| ProtocolError::Custom(ERR_OBSERVER_LOCK.to_string()))?;
        observers.push(Box::new(observer));
        Ok(())
    }

    pub fn emit(&self, event: StackEvent) {
        match self.observers.read() {
            Ok(observers) => {
                for observer in observers.iter() {
                    observer(&event);
                }
            }
            Err(_) => warn!(event = event.kind(), "{}", ERR_OBSERVER_LOCK),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}
