//! Meaning layer (6). Harmonic, energetic and text views of the payload.

use crate::core::packet::{
    payload_text, DecodedMeaning, EncodedMeaning, EnergeticDescriptor, HarmonicDescriptor, Packet,
};
use crate::error::Result;
use crate::stack::layer::{Layer, StackContext};
use async_trait::async_trait;
use serde_json::Value;

/// Base frequency of the energetic representation, in Hz
const BASE_FREQUENCY: f64 = 432.0;
const SYMBOLS: [&str; 5] = ["∞", "◉", "✧", "⟡", "◈"];

/// Layer 6: parallel representations of the payload.
#[derive(Debug, Default)]
pub struct MeaningLayer;

impl MeaningLayer {
    pub fn encode(payload: &Value, coherence: f64) -> EncodedMeaning {
        let json_len = payload.to_string().chars().count();
        let intensity = json_len as f64 * coherence;
        EncodedMeaning {
            text: payload_text(payload),
            energetic: EnergeticDescriptor {
                intensity,
                frequency: BASE_FREQUENCY + intensity * 100.0,
                waveform: "sine".to_string(),
            },
            symbolic: SYMBOLS[json_len % SYMBOLS.len()].to_string(),
            harmonic: HarmonicDescriptor {
                root: 256.0,
                overtones: vec![512.0, 768.0, 1024.0],
                rhythm: "4:3:2".to_string(),
            },
        }
    }

    pub fn decode(encoded: &EncodedMeaning) -> DecodedMeaning {
        DecodedMeaning {
            text: encoded.text.clone(),
            feeling: format!("Energy at {}Hz", encoded.energetic.frequency),
            symbol: encoded.symbolic.clone(),
        }
    }
}

#[async_trait]
impl Layer for MeaningLayer {
    fn index(&self) -> u8 {
        6
    }

    fn name(&self) -> &'static str {
        "meaning"
    }

    async fn process_outgoing(&mut self, mut packet: Packet, ctx: &mut StackContext) -> Packet {
        packet.encoded_meaning = Some(Self::encode(&packet.payload, ctx.coherence_level()));
        packet
    }

    async fn process_incoming(&mut self, mut packet: Packet, _ctx: &mut StackContext) -> Result<Packet> {
        if let Some(encoded) = packet.encoded_meaning.as_ref() {
            packet.decoded_meaning = Some(Self::decode(encoded));
        }
        Ok(packet)
    }
}
