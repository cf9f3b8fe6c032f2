//! Origin layer (0). Signs outgoing packets and rejects unsigned ones.

use crate::core::packet::{Packet, ORIGIN_SIGNATURE_LEN};
use crate::error::constants::{ERR_MISSING_ORIGIN, ERR_ORIGIN_LENGTH};
use crate::error::{ProtocolError, Result};
use crate::stack::layer::{Layer, StackContext};
use crate::utils::digest;
use crate::utils::time::current_timestamp;
use async_trait::async_trait;
use tracing::debug;

/// Layer 0: every packet must carry a signature of exactly eight bytes.
#[derive(Debug, Default)]
pub struct OriginLayer;

impl OriginLayer {
    /// SHA-256(32 random bytes ‖ timestamp) truncated to eight bytes.
    pub fn generate_signature() -> Vec<u8> {
        digest::signature(ORIGIN_SIGNATURE_LEN, current_timestamp())
    }
}

#[async_trait]
impl Layer for OriginLayer {
    fn index(&self) -> u8 {
        0
    }

    fn name(&self) -> &'static str {
        "origin"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Packet {
        if packet.origin_signature.is_empty() {
            packet.origin_signature = Self::generate_signature();
        }
        packet
    }

    async fn process_incoming(&mut self, packet: Packet, _ctx: &mut StackContext) -> Result<Packet> {
        if packet.origin_signature.is_empty() {
            return Err(ProtocolError::InvalidOrigin(ERR_MISSING_ORIGIN.to_string()));
        }
        if packet.origin_signature.len() != ORIGIN_SIGNATURE_LEN {
            debug!(len = packet.origin_signature.len(), "Rejecting packet origin");
            return Err(ProtocolError::InvalidOrigin(format!(
                "{ERR_ORIGIN_LENGTH}: {} bytes",
                packet.origin_signature.len()
            )));
        }
        Ok(packet)
    }
}
