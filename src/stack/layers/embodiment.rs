//! Embodiment layer (7). Final stamp and the sent/received events.

use crate::core::packet::{Finalized, Packet};
use crate::error::Result;
use crate::stack::events::StackEvent;
use crate::stack::layer::{Layer, StackContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Layer 7: marks the packet final and announces it.
#[derive(Debug, Default)]
pub struct EmbodimentLayer;

#[async_trait]
impl Layer for EmbodimentLayer {
    fn index(&self) -> u8 {
        7
    }

    fn name(&self) -> &'static str {
        "embodiment"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Packet {
        packet.finalized = Some(Finalized::Sent);
        ctx.emit(StackEvent::PacketSent(Arc::new(packet.clone())));
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Result<Packet> {
        packet.finalized = Some(Finalized::Received);

        if let Some(integration) = packet.integrated_presence.as_ref() {
            ctx.emit(StackEvent::FieldEvolved {
                previous_coherence: integration.previous_coherence,
                new_coherence: integration.new_coherence,
                catalyst: packet.intention(),
            });
        }

        ctx.emit(StackEvent::PacketReceived(Arc::new(packet.clone())));
        Ok(packet)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::packet::PresenceIntegration;
    use crate::stack::layers::test_support::{context, packet};
    use serde_json::Value;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_field_evolved_only_after_integration() {
        let mut ctx = context(vec![0; 16]);
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = kinds.clone();
        ctx.events
            .register(move |e| sink.lock().unwrap().push(e.kind()))
            .unwrap();

        EmbodimentLayer
            .process_incoming(packet(vec![0; 16], 0.5, Value::Null), &mut ctx)
            .await
            .unwrap();

        let mut p = packet(vec![0; 16], 0.5, Value::Null);
        p.integrated_presence = Some(PresenceIntegration {
            previous_coherence: 0.4,
            new_coherence: 0.6,
        });
        let p = EmbodimentLayer.process_incoming(p, &mut ctx).await.unwrap();

        assert_eq!(p.finalized, Some(Finalized::Received));
        assert_eq!(
            *kinds.lock().unwrap(),
            vec!["packet:received", "field:evolved", "packet:received"]
        );
    }
}
