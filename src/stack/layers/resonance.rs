//! Resonance layer (4). Correlation tags on the way out, repair flags and
//! field coherence on the way in.

use crate::core::packet::{clamp_unit, Intention, Packet, ResonanceTag};
use crate::error::Result;
use crate::stack::layer::{Layer, StackContext};
use crate::stack::resonance_buffer::ResonanceBuffer;
use crate::utils::digest;
use crate::utils::time::current_timestamp;
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

/// Packets at or below this coherence are flagged for repair
const REPAIR_COHERENCE: f64 = 0.3;
/// Field-coherence bonus for healing packets
const HEALING_BONUS: f64 = 0.2;

/// Layer 4: correlation tags out, soft health checks in.
///
/// The sequence number is a debugging aid. Receivers never use it to detect
/// gaps or reorder packets.
#[derive(Debug)]
pub struct ResonanceLayer {
    buffer: ResonanceBuffer,
    next_sequence: u64,
}

impl ResonanceLayer {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            buffer: ResonanceBuffer::with_settings(ttl, capacity),
            next_sequence: 0,
        }
    }

    pub fn buffer(&self) -> &ResonanceBuffer {
        &self.buffer
    }

    fn field_coherence(packet: &Packet) -> f64 {
        let bonus = if packet.intention() == Intention::Healing {
            HEALING_BONUS
        } else {
            0.0
        };
        clamp_unit(packet.coherence_score + packet.field_compatibility.unwrap_or(0.0) + bonus)
    }
}

impl Default for ResonanceLayer {
    fn default() -> Self {
        Self {
            buffer: ResonanceBuffer::default(),
            next_sequence: 0,
        }
    }
}

#[async_trait]
impl Layer for ResonanceLayer {
    fn index(&self) -> u8 {
        4
    }

    fn name(&self) -> &'static str {
        "resonance"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Packet {
        let correlation_id: [u8; 4] = digest::random_array();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.buffer.record(correlation_id, sequence, current_timestamp());
        trace!(sequence, "Resonance tag attached");

        packet.resonance = Some(ResonanceTag {
            correlation_id: correlation_id.to_vec(),
            sequence,
        });
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Result<Packet> {
        packet.needs_resonance_repair =
            packet.coherence_score <= REPAIR_COHERENCE || packet.integrity_digest.is_none();
        packet.field_coherence = Some(Self::field_coherence(&packet));
        Ok(packet)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stack::layers::test_support::{context, packet};
    use serde_json::Value;

    #[tokio::test]
    async fn test_sequence_is_monotonic_past_eviction() {
        let mut ctx = context(vec![0; 16]);
        let mut layer = ResonanceLayer::new(Duration::from_secs(60), 2);
        let mut sequences = Vec::new();
        for _ in 0..5 {
            let p = layer
                .process_outgoing(packet(vec![0; 16], 0.5, Value::Null), &mut ctx)
                .await;
            sequences.push(p.resonance.unwrap().sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(layer.buffer().len(), 2);
    }

    #[tokio::test]
    async fn test_low_coherence_flags_repair() {
        let mut ctx = context(vec![0; 16]);
        let mut p = packet(vec![0; 16], 0.3, Value::Null);
        p.integrity_digest = Some(vec![0; 32]);
        let p = ResonanceLayer::default().process_incoming(p, &mut ctx).await.unwrap();
        assert!(p.needs_resonance_repair);
    }

    #[tokio::test]
    async fn test_missing_digest_flags_repair() {
        let mut ctx = context(vec![0; 16]);
        let p = packet(vec![0; 16], 0.9, Value::Null);
        let p = ResonanceLayer::default().process_incoming(p, &mut ctx).await.unwrap();
        assert!(p.needs_resonance_repair);
    }

    #[tokio::test]
    async fn test_healthy_packet_clears_stale_repair_flag() {
        let mut ctx = context(vec![0; 16]);
        let mut p = packet(vec![0; 16], 0.8, Value::Null);
        p.integrity_digest = Some(vec![0; 32]);
        p.needs_resonance_repair = true;
        let p = ResonanceLayer::default().process_incoming(p, &mut ctx).await.unwrap();
        assert!(!p.needs_resonance_repair);
    }

    #[tokio::test]
    async fn test_healing_field_coherence_capped() {
        let mut ctx = context(vec![0; 16]);
        let mut p = packet(vec![0; 16], 0.7, Value::Null);
        p.integrity_digest = Some(vec![0; 32]);
        p.field_compatibility = Some(0.9);
        p.decoded_intention = Some(Intention::Healing);
        let p = ResonanceLayer::default().process_incoming(p, &mut ctx).await.unwrap();
        assert!(!p.needs_resonance_repair);
        assert_eq!(p.field_coherence, Some(1.0));
    }

    #[tokio::test]
    async fn test_field_coherence_sum() {
        let mut ctx = context(vec![0; 16]);
        let mut p = packet(vec![0; 16], 0.2, Value::Null);
        p.field_compatibility = Some(0.3);
        p.decoded_intention = Some(Intention::Connection);
        let p = ResonanceLayer::default().process_incoming(p, &mut ctx).await.unwrap();
        assert!((p.field_coherence.unwrap() - 0.5).abs() < 1e-9);
    }
}
