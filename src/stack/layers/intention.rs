//! Intention layer (3).

use crate::core::packet::{Intention, Packet, RoutingHint};
use crate::error::Result;
use crate::stack::layer::{Layer, StackContext};
use async_trait::async_trait;

/// Layer 3: path hints out, intention decoding in.
#[derive(Debug, Default)]
pub struct IntentionLayer;

impl IntentionLayer {
    /// Static path suggestion; routers make the real choice.
    fn resonant_path() -> RoutingHint {
        RoutingHint {
            primary: "direct".to_string(),
            alternatives: vec!["field-bounce".to_string(), "coherence-relay".to_string()],
            resonance_score: 0.8,
        }
    }
}

#[async_trait]
impl Layer for IntentionLayer {
    fn index(&self) -> u8 {
        3
    }

    fn name(&self) -> &'static str {
        "intention"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Packet {
        packet.routing_hint = Some(Self::resonant_path());
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Result<Packet> {
        packet.decoded_intention = Some(Intention::decode(
            &packet.intention_vector,
            &packet.field_vector,
        ));
        Ok(packet)
    }
}
