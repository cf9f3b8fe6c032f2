//! Presence layer (5). Carries the sender's coherence snapshot and folds it
//! into the receiver's level.

use crate::core::packet::{Packet, PresenceEnvelope, PresenceIntegration, PresenceSnapshot};
use crate::error::Result;
use crate::stack::events::StackEvent;
use crate::stack::layer::{Layer, StackContext};
use crate::utils::time::current_timestamp;
use async_trait::async_trait;
use tracing::debug;

/// Layer 5: wraps the payload with the sender's state and folds a remote
/// sender's coherence into the local one.
#[derive(Debug, Default)]
pub struct PresenceLayer;

#[async_trait]
impl Layer for PresenceLayer {
    fn index(&self) -> u8 {
        5
    }

    fn name(&self) -> &'static str {
        "presence"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Packet {
        let continuity = packet
            .session_id
            .as_deref()
            .map(|id| ctx.sessions.record_exchange(id));

        packet.presence = Some(PresenceEnvelope {
            snapshot: PresenceSnapshot {
                coherence: ctx.coherence_level(),
                field_vector: ctx.field_vector.clone(),
                timestamp: current_timestamp(),
            },
            payload: packet.payload.clone(),
            continuity,
        });
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Result<Packet> {
        let Some(envelope) = packet.presence.as_ref() else {
            return Ok(packet);
        };

        let previous = ctx.coherence_level();
        ctx.set_coherence_level((previous + envelope.snapshot.coherence) / 2.0);
        let current = ctx.coherence_level();
        debug!(previous, current, "Presence integrated");

        packet.payload = envelope.payload.clone();
        packet.integrated_presence = Some(PresenceIntegration {
            previous_coherence: previous,
            new_coherence: current,
        });
        ctx.emit(StackEvent::PresenceIntegrated { previous, current });
        Ok(packet)
    }
}
