//! The layer contract and the state layers share.

use crate::core::packet::{clamp_unit, Packet};
use crate::error::Result;
use crate::stack::events::{EventBus, StackEvent};
use crate::stack::session_table::SessionTable;
use async_trait::async_trait;

/// Node-local state every layer may read and update.
///
/// Kept apart from the layer table so a layer can hold `&mut self` and
/// `&mut StackContext` at the same time.
#[derive(Debug)]
pub struct StackContext {
    pub node_id: String,
    pub field_vector: Vec<u8>,
    coherence_level: f64,
    pub field_compatibility_threshold: f64,
    pub sessions: SessionTable,
    pub events: EventBus,
}

impl StackContext {
    pub fn new(
        node_id: String,
        field_vector: Vec<u8>,
        coherence_level: f64,
        field_compatibility_threshold: f64,
        sessions: SessionTable,
    ) -> Self {
        Self {
            node_id,
            field_vector,
            coherence_level: clamp_unit(coherence_level),
            field_compatibility_threshold,
            sessions,
            events: EventBus::new(),
        }
    }

    pub fn coherence_level(&self) -> f64 {
        self.coherence_level
    }

    pub fn set_coherence_level(&mut self, value: f64) {
        self.coherence_level = clamp_unit(value);
    }

    pub fn emit(&self, event: StackEvent) {
        self.events.emit(event);
    }
}

/// One ordered stage of the pipeline.
///
/// Outgoing transforms only add data and cannot fail. Incoming transforms may
/// reject a packet; the stack stops the fold at the first rejection.
#[async_trait]
pub trait Layer: Send + Sync {
    /// Position in the layer table, 0 (origin) to 7 (embodiment)
    fn index(&self) -> u8;

    fn name(&self) -> &'static str;

    async fn process_outgoing(&mut self, packet: Packet, ctx: &mut StackContext) -> Packet;

    async fn process_incoming(&mut self, packet: Packet, ctx: &mut StackContext) -> Result<Packet>;
}
