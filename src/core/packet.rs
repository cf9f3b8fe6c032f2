//! The packet envelope carried through the luminous stack.
//!
//! A [`Packet`] is created once per `Stack::send`, mutated in place by each
//! layer, dispatched by the router and then dropped. Every field a layer may
//! attach is declared here up front; a layer that has not run simply leaves
//! its annotation at `None` / `false`.
//!
//! Byte fields are `Vec<u8>` rather than fixed arrays: a packet read off the
//! wire may carry a missing or mis-sized field, and rejecting it is the job of
//! the origin layer, not of the deserializer.

use crate::core::hex_bytes;
use crate::utils::digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Origin signature length in bytes (64 bits)
pub const ORIGIN_SIGNATURE_LEN: usize = 8;
/// Field vector length in bytes (128 bits)
pub const FIELD_VECTOR_LEN: usize = 16;
/// Session id length in bytes (256 bits)
pub const SESSION_ID_LEN: usize = 32;
/// Intention vector length in bytes (512 bits)
pub const INTENTION_VECTOR_LEN: usize = 64;
/// Integrity digest length in bytes (SHA-256)
pub const INTEGRITY_DIGEST_LEN: usize = digest::SHA256_LEN;
/// Maximum text annotation length in bytes
pub const TEXT_ANNOTATION_LEN: usize = 16;

/// Harmony flags carried in packet metadata
pub mod harmonies {
    pub const TRANSPARENCY: u8 = 0x01;
    pub const COHERENCE: u8 = 0x02;
    pub const RESONANCE: u8 = 0x04;
    pub const AGENCY: u8 = 0x08;
    pub const VITALITY: u8 = 0x10;
    pub const MUTUALITY: u8 = 0x20;
    pub const NOVELTY: u8 = 0x40;
}

/// Coarse purpose of a packet; selects the routing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intention {
    Unknown,
    #[default]
    Connection,
    Healing,
    Inquiry,
    Offering,
    Completion,
}

/// Decoding table indexed by the intention code.
const INTENTION_TABLE: [Intention; 6] = [
    Intention::Unknown,
    Intention::Connection,
    Intention::Healing,
    Intention::Inquiry,
    Intention::Offering,
    Intention::Completion,
];

impl Intention {
    /// Intentions a sender may declare
    pub const DECLARABLE: [Intention; 5] = [
        Intention::Connection,
        Intention::Healing,
        Intention::Inquiry,
        Intention::Offering,
        Intention::Completion,
    ];

    /// Wire code: the index into the decoding table.
    pub fn code(self) -> u8 {
        match self {
            Intention::Unknown => 0,
            Intention::Connection => 1,
            Intention::Healing => 2,
            Intention::Inquiry => 3,
            Intention::Offering => 4,
            Intention::Completion => 5,
        }
    }

    /// Table lookup; anything outside the table is `Unknown`.
    pub fn from_code(code: u8) -> Self {
        INTENTION_TABLE
            .get(code as usize)
            .copied()
            .unwrap_or(Intention::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intention::Unknown => "unknown",
            Intention::Connection => "connection",
            Intention::Healing => "healing",
            Intention::Inquiry => "inquiry",
            Intention::Offering => "offering",
            Intention::Completion => "completion",
        }
    }

    /// Build the intention vector: the base pattern (intention code in the
    /// first byte, zeros after) with every byte shifted by the sender's field
    /// vector, modulo 256.
    pub fn encode(self, field_vector: &[u8]) -> Vec<u8> {
        let mut vector = vec![0u8; INTENTION_VECTOR_LEN];
        vector[0] = self.code();
        if !field_vector.is_empty() {
            for (i, byte) in vector.iter_mut().enumerate() {
                *byte = byte.wrapping_add(field_vector[i % field_vector.len()]);
            }
        }
        vector
    }

    /// Recover the intention from the first byte of `vector`, removing the
    /// modulation applied with `field_vector`.
    pub fn decode(vector: &[u8], field_vector: &[u8]) -> Self {
        let Some(&first) = vector.first() else {
            return Intention::Unknown;
        };
        let shift = field_vector.first().copied().unwrap_or(0);
        Self::from_code(first.wrapping_sub(shift))
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connection" => Ok(Intention::Connection),
            "healing" => Ok(Intention::Healing),
            "inquiry" => Ok(Intention::Inquiry),
            "offering" => Ok(Intention::Offering),
            "completion" => Ok(Intention::Completion),
            "unknown" => Ok(Intention::Unknown),
            other => Err(format!("unknown intention '{other}'")),
        }
    }
}

/// Position of a packet within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Unset,
    Initiating,
    Established,
}

/// Free-form metadata every packet carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketMetadata {
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Node id of the creating stack
    pub sender_id: String,
    /// Incremented once per router relay
    #[serde(default)]
    pub hop_count: u32,
    /// Bit set of [`harmonies`] flags
    #[serde(default)]
    pub harmonies: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Path suggestion attached by the intention layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingHint {
    pub primary: String,
    pub alternatives: Vec<String>,
    pub resonance_score: f64,
}

/// Correlation data attached by the resonance layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonanceTag {
    #[serde(with = "hex_bytes")]
    pub correlation_id: Vec<u8>,
    pub sequence: u64,
}

/// The sender's local state at the moment the presence layer wrapped the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub coherence: f64,
    #[serde(with = "hex_bytes")]
    pub field_vector: Vec<u8>,
    pub timestamp: u64,
}

/// How long a session has been running and how many packets it has carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Continuity {
    pub session_duration_ms: u64,
    pub exchange_count: u64,
}

/// Payload wrapped with presence information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEnvelope {
    pub snapshot: PresenceSnapshot,
    pub payload: Value,
    #[serde(default)]
    pub continuity: Option<Continuity>,
}

/// Result of folding a remote presence into the receiver's coherence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceIntegration {
    pub previous_coherence: f64,
    pub new_coherence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergeticDescriptor {
    pub intensity: f64,
    pub frequency: f64,
    pub waveform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicDescriptor {
    pub root: f64,
    pub overtones: Vec<f64>,
    pub rhythm: String,
}

/// Parallel representations of the payload produced by the meaning layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedMeaning {
    /// Raw text form: the payload itself for strings, its JSON otherwise
    pub text: String,
    pub energetic: EnergeticDescriptor,
    pub symbolic: String,
    pub harmonic: HarmonicDescriptor,
}

/// Receiver-side presentation of [`EncodedMeaning`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMeaning {
    pub text: String,
    pub feeling: String,
    pub symbol: String,
}

/// Which terminal layer pass finalized the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finalized {
    Sent,
    Received,
}

/// Route selection strategy chosen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStrategy {
    /// Healing: multicast to the highest-coherence peers
    CoherenceAmplification,
    /// Inquiry: multicast to peers with the most different field vectors
    WisdomGathering,
    /// Offering: broadcast to every eligible peer
    GenerousSharing,
    /// Everything else: unicast to the most similar field vector
    ResonantConnection,
}

impl RouteStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteStrategy::CoherenceAmplification => "coherence-amplification",
            RouteStrategy::WisdomGathering => "wisdom-gathering",
            RouteStrategy::GenerousSharing => "generous-sharing",
            RouteStrategy::ResonantConnection => "resonant-connection",
        }
    }
}

/// Annotations a router writes before dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAnnotation {
    pub router_id: String,
    pub strategy: RouteStrategy,
    pub timestamp: u64,
    /// Score before the router boosted it, if it did
    #[serde(default)]
    pub boosted_from: Option<f64>,
    #[serde(default)]
    pub amplified: bool,
    /// Inquiry replies accumulate here as they travel back
    #[serde(default)]
    pub inquiry_accumulator: Option<Vec<Value>>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Why a router could not place a packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingFailure {
    pub reason: String,
    pub suggestion: String,
}

/// The envelope moved through the layered pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(with = "hex_bytes", default)]
    pub origin_signature: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub field_vector: Vec<u8>,
    #[serde(with = "hex_bytes::option", default)]
    pub session_id: Option<Vec<u8>>,
    #[serde(default)]
    pub session_phase: SessionPhase,
    #[serde(with = "hex_bytes", default)]
    pub intention_vector: Vec<u8>,
    pub coherence_score: f64,
    #[serde(default)]
    pub payload: Value,
    #[serde(with = "hex_bytes::option", default)]
    pub integrity_digest: Option<Vec<u8>>,
    #[serde(default)]
    pub text_annotation: String,
    pub metadata: PacketMetadata,

    // Layer annotations, populated progressively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_compatibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_hint: Option<RoutingHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_intention: Option<Intention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance: Option<ResonanceTag>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_resonance_repair: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_coherence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_presence: Option<PresenceIntegration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_meaning: Option<EncodedMeaning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_meaning: Option<DecodedMeaning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized: Option<Finalized>,

    // Router annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingAnnotation>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub routing_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_failure: Option<RoutingFailure>,
}

/// Clamp a coherence value into [0, 1]; NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl Packet {
    /// A bare packet with no layer annotations.
    pub fn new(
        origin_signature: Vec<u8>,
        field_vector: Vec<u8>,
        intention_vector: Vec<u8>,
        coherence_score: f64,
        payload: Value,
        metadata: PacketMetadata,
    ) -> Self {
        Self {
            origin_signature,
            field_vector,
            session_id: None,
            session_phase: SessionPhase::Unset,
            intention_vector,
            coherence_score: clamp_unit(coherence_score),
            payload,
            integrity_digest: None,
            text_annotation: String::new(),
            metadata,
            field_compatibility: None,
            routing_hint: None,
            decoded_intention: None,
            resonance: None,
            needs_resonance_repair: false,
            field_coherence: None,
            presence: None,
            integrated_presence: None,
            encoded_meaning: None,
            decoded_meaning: None,
            finalized: None,
            routing: None,
            routing_failed: false,
            routing_failure: None,
        }
    }

    /// Set the coherence score, clamped to [0, 1].
    pub fn set_coherence(&mut self, value: f64) {
        self.coherence_score = clamp_unit(value);
    }

    /// Drop the annotations only a receiving stack may write. A sender cannot
    /// pre-populate them through the envelope.
    pub fn clear_receiver_annotations(&mut self) {
        self.field_compatibility = None;
        self.decoded_intention = None;
        self.needs_resonance_repair = false;
        self.field_coherence = None;
        self.integrated_presence = None;
        self.decoded_meaning = None;
        self.finalized = None;
    }

    /// The decoded intention when the intention layer has run, otherwise the
    /// intention recovered directly from the intention vector.
    pub fn intention(&self) -> Intention {
        self.decoded_intention
            .unwrap_or_else(|| Intention::decode(&self.intention_vector, &self.field_vector))
    }

    /// SHA-256 over origin ‖ field ‖ intention ‖ coherence byte ‖ JSON(payload).
    pub fn compute_integrity_digest(&self) -> Vec<u8> {
        let coherence_byte = [(self.coherence_score * 255.0) as u8];
        let payload = serde_json::to_vec(&self.payload).unwrap_or_default();
        digest::sha256_concat(&[
            &self.origin_signature,
            &self.field_vector,
            &self.intention_vector,
            &coherence_byte,
            &payload,
        ])
        .to_vec()
    }

    /// Recompute the digest and compare it with the carried one.
    ///
    /// Receiving layers never call this; relays and verification collaborators
    /// may. Any change to the covered fields (including a router boost of the
    /// coherence score) makes it fail.
    pub fn verify_integrity(&self) -> bool {
        self.integrity_digest
            .as_deref()
            .is_some_and(|d| d == self.compute_integrity_digest().as_slice())
    }

    /// Text form of the payload: strings verbatim, anything else as JSON.
    pub fn payload_text(&self) -> String {
        payload_text(&self.payload)
    }

    pub fn session_id_hex(&self) -> Option<String> {
        self.session_id.as_deref().map(hex::encode)
    }
}

/// Text form of a payload value: strings verbatim, anything else as JSON.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Mean similarity of two byte vectors: `mean(1 - |a - b| / 255)` over the
/// shorter length. Two empty vectors have similarity 0.
pub fn vector_similarity(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| 1.0 - (f64::from(*x) - f64::from(*y)).abs() / 255.0)
        .sum();
    total / len as f64
}

/// Mean absolute byte difference over the shorter length (0 - 255).
pub fn vector_distance(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (f64::from(*x) - f64::from(*y)).abs())
        .sum();
    total / len as f64
}

/// Byte-wise floor average over the shorter length.
pub fn vector_average(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter()
        .zip(b)
        .map(|(x, y)| ((u16::from(*x) + u16::from(*y)) / 2) as u8)
        .collect()
}
