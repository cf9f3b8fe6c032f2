//! Session layer (2).
//!
//! Outgoing packets without a session open one; incoming invitations are
//! accepted when the field and the sender are coherent enough.

use crate::core::packet::{Packet, SessionPhase, SESSION_ID_LEN};
use crate::error::Result;
use crate::stack::events::StackEvent;
use crate::stack::layer::{Layer, StackContext};
use crate::utils::digest;
use async_trait::async_trait;
use tracing::debug;

/// Minimum field compatibility for accepting an invitation (exclusive)
const ACCEPT_COMPATIBILITY: f64 = 0.5;
/// Minimum packet coherence for accepting an invitation (exclusive)
const ACCEPT_COHERENCE: f64 = 0.4;

/// Layer 2: opens sessions and answers invitations.
///
/// A session id, once set on a packet, is never replaced.
#[derive(Debug, Default)]
pub struct SessionLayer;

impl SessionLayer {
    fn accepts(packet: &Packet) -> bool {
        packet.field_compatibility.unwrap_or(0.0) > ACCEPT_COMPATIBILITY
            && packet.coherence_score > ACCEPT_COHERENCE
    }
}

#[async_trait]
impl Layer for SessionLayer {
    fn index(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "session"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Packet {
        if packet.session_id.is_none() {
            packet.session_id = Some(digest::random_bytes(SESSION_ID_LEN));
            packet.session_phase = SessionPhase::Initiating;
        }
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Result<Packet> {
        if packet.session_phase != SessionPhase::Initiating {
            return Ok(packet);
        }
        let Some(session_id) = packet.session_id.clone() else {
            return Ok(packet);
        };

        if Self::accepts(&packet) {
            let compatibility = packet.field_compatibility.unwrap_or(0.0);
            let remote = packet.metadata.sender_id.clone();
            if ctx.sessions.establish(&session_id, &remote, compatibility) {
                ctx.emit(StackEvent::SessionEstablished {
                    session_id,
                    remote_node: remote,
                });
            }
            packet.session_phase = SessionPhase::Established;
        } else {
            // Rejected invitations leave no record behind
            debug!(
                compatibility = packet.field_compatibility,
                coherence = packet.coherence_score,
                "Session invitation declined"
            );
        }
        Ok(packet)
    }
}
