//! Field layer (1). Field-vector blending and the dissonance check.

use crate::core::packet::{vector_average, vector_similarity, Packet};
use crate::error::{ProtocolError, Result};
use crate::stack::layer::{Layer, StackContext};
use async_trait::async_trait;
use tracing::debug;

/// Layer 1: blends the packet's field vector with the local one on the way
/// out and measures compatibility on the way in.
#[derive(Debug, Default)]
pub struct FieldLayer;

#[async_trait]
impl Layer for FieldLayer {
    fn index(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "field"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Packet {
        packet.field_vector = vector_average(&packet.field_vector, &ctx.field_vector);
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Result<Packet> {
        let compatibility = vector_similarity(&ctx.field_vector, &packet.field_vector);
        let threshold = ctx.field_compatibility_threshold;
        if compatibility < threshold {
            debug!(compatibility, threshold, "Field states too dissonant");
            return Err(ProtocolError::FieldDissonance {
                compatibility,
                threshold,
            });
        }
        packet.field_compatibility = Some(compatibility);
        Ok(packet)
    }
}
