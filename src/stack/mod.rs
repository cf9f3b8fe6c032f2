//! # Luminous Stack
//!
//! The eight-layer packet pipeline of one node.
//!
//! A [`Stack`] owns its layer table and its node-local state (field vector,
//! coherence level, session table, observers). Sending builds a packet and
//! folds it through layers 7 → 0; receiving decodes the envelope and folds it
//! through layers 0 → 7, stopping at the first rejection.
//!
//! ## Usage
//! ```rust,no_run
//! use luminous_stack::config::StackConfig;
//! use luminous_stack::core::packet::Intention;
//! use luminous_stack::stack::{SendOptions, Stack};
//! use serde_json::json;
//!
//! # async fn demo() -> luminous_stack::error::Result<()> {
//! let mut alice = Stack::new(&StackConfig::default());
//! let mut bob = Stack::new(&StackConfig::default());
//!
//! let packet = alice
//!     .send(json!("hello"), SendOptions::with_intention(Intention::Offering))
//!     .await;
//! let raw = alice.encode(&packet)?;
//! let received = bob.receive(&raw).await?;
//! assert_eq!(received.payload, json!("hello"));
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod layer;
pub mod layers;
pub mod resonance_buffer;
pub mod session_table;

pub use events::{Direction, EventBus, StackEvent};
pub use layer::{Layer, StackContext};

use crate::config::StackConfig;
use crate::core::packet::{
    clamp_unit, harmonies, Intention, Packet, PacketMetadata, FIELD_VECTOR_LEN,
    TEXT_ANNOTATION_LEN,
};
use crate::core::serialization::{MultiFormat, SerializationFormat};
use crate::error::{ProtocolError, Result};
use crate::utils::digest;
use crate::utils::time::current_timestamp;
use rand::seq::IndexedRandom;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use layers::OriginLayer;
use session_table::SessionTable;

const TEXT_ANNOTATIONS: [&str; 5] = [
    "May this connection serve the highest good",
    "May presence flow freely between us",
    "May our fields dance in harmony",
    "May this exchange bring coherence",
    "May love guide this communion",
];

/// Per-send options for [`Stack::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Continue an existing session instead of opening a new one
    pub session_id: Option<Vec<u8>>,
    pub intention: Intention,
    /// Harmony bit set; defaults to `harmonies::COHERENCE`
    pub harmonies: Option<u8>,
}

impl SendOptions {
    pub fn with_intention(intention: Intention) -> Self {
        Self {
            intention,
            ..Self::default()
        }
    }

    pub fn in_session(mut self, session_id: Vec<u8>) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_on_char_boundary(text: &str, max: usize) -> String {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Random bytes scaled by `coherence`: lower coherence, narrower field.
pub fn generate_field_vector(coherence: f64) -> Vec<u8> {
    let coherence = clamp_unit(coherence);
    digest::random_bytes(FIELD_VECTOR_LEN)
        .into_iter()
        .map(|b| (f64::from(b) * coherence).floor() as u8)
        .collect()
}

pub struct Stack {
    layers: Vec<Box<dyn Layer>>,
    ctx: StackContext,
    format: SerializationFormat,
}

impl Stack {
    /// A stack with a random node id (unless configured) and a fresh field vector.
    pub fn new(config: &StackConfig) -> Self {
        let field_vector = generate_field_vector(config.coherence_level);
        Self::with_field_vector(config, field_vector)
    }

    pub fn with_field_vector(config: &StackConfig, field_vector: Vec<u8>) -> Self {
        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let sessions = SessionTable::new(config.max_sessions, config.session_ttl);
        Self {
            layers: layers::default_layers(config),
            ctx: StackContext::new(
                node_id,
                field_vector,
                config.coherence_level,
                config.field_compatibility_threshold,
                sessions,
            ),
            format: SerializationFormat::default(),
        }
    }

    /// Envelope format used by [`Stack::encode`].
    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.ctx.node_id
    }

    pub fn field_vector(&self) -> &[u8] {
        &self.ctx.field_vector
    }

    pub fn set_field_vector(&mut self, field_vector: Vec<u8>) {
        self.ctx.field_vector = field_vector;
    }

    pub fn coherence_level(&self) -> f64 {
        self.ctx.coherence_level()
    }

    pub fn set_coherence_level(&mut self, value: f64) {
        self.ctx.set_coherence_level(value);
    }

    pub fn field_compatibility_threshold(&self) -> f64 {
        self.ctx.field_compatibility_threshold
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.ctx.sessions
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    /// Register an observer for every event this stack emits.
    pub fn on_event<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(&StackEvent) + Send + Sync + 'static,
    {
        self.ctx.events.register(observer)
    }

    /// Build an unprocessed packet. Never fails.
    pub fn create_packet(&self, payload: Value, options: &SendOptions) -> Packet {
        let timestamp = current_timestamp();
        let field_vector = self.ctx.field_vector.clone();
        let intention_vector = options.intention.encode(&field_vector);

        let mut packet = Packet::new(
            OriginLayer::generate_signature(),
            field_vector,
            intention_vector,
            self.ctx.coherence_level(),
            payload,
            PacketMetadata {
                timestamp,
                sender_id: self.ctx.node_id.clone(),
                hop_count: 0,
                harmonies: options.harmonies.unwrap_or(harmonies::COHERENCE),
                extra: BTreeMap::new(),
            },
        );

        if let Some(session_id) = options.session_id.clone() {
            packet.session_id = Some(session_id);
            packet.session_phase = crate::core::packet::SessionPhase::Established;
        }

        let annotation = TEXT_ANNOTATIONS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(TEXT_ANNOTATIONS[0]);
        packet.text_annotation = truncate_on_char_boundary(annotation, TEXT_ANNOTATION_LEN);
        packet.integrity_digest = Some(packet.compute_integrity_digest());
        packet
    }

    /// Build a packet and fold it through layers 7 → 0.
    #[instrument(skip(self, payload, options), fields(node = %self.ctx.node_id, intention = %options.intention))]
    pub async fn send(&mut self, payload: Value, options: SendOptions) -> Packet {
        let mut packet = self.create_packet(payload, &options);
        for layer in self.layers.iter_mut().rev() {
            packet = layer.process_outgoing(packet, &mut self.ctx).await;
            self.ctx.emit(StackEvent::LayerProcessed {
                layer: layer.index(),
                name: layer.name(),
                direction: Direction::Outgoing,
            });
        }
        debug!(session = ?packet.session_id_hex(), "Packet sent through stack");
        packet
    }

    /// Decode a wire envelope and fold it through layers 0 → 7.
    ///
    /// Accepts a format-tagged envelope or a bare JSON object.
    ///
    /// # Errors
    /// `DeserializeError` for a malformed envelope, otherwise the first layer
    /// rejection (`InvalidOrigin`, `FieldDissonance`).
    pub async fn receive(&mut self, raw: &[u8]) -> Result<Packet> {
        let packet = decode_packet(raw)?;
        self.receive_packet(packet).await
    }

    /// Fold an already decoded packet through layers 0 → 7.
    #[instrument(skip(self, packet), fields(node = %self.ctx.node_id, sender = %packet.metadata.sender_id))]
    pub async fn receive_packet(&mut self, mut packet: Packet) -> Result<Packet> {
        // Wire input may carry any float
        packet.set_coherence(packet.coherence_score);
        packet.clear_receiver_annotations();
        for layer in self.layers.iter_mut() {
            packet = match layer.process_incoming(packet, &mut self.ctx).await {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(layer = layer.name(), error = %e, "Packet rejected");
                    return Err(e);
                }
            };
            self.ctx.emit(StackEvent::LayerProcessed {
                layer: layer.index(),
                name: layer.name(),
                direction: Direction::Incoming,
            });
        }
        Ok(packet)
    }

    /// Serialize a packet with this stack's envelope format.
    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        packet.serialize_with_header(self.format)
    }
}

/// The single wire-to-packet boundary.
pub fn decode_packet(raw: &[u8]) -> Result<Packet> {
    match raw.first() {
        None => Err(ProtocolError::DeserializeError(
            crate::error::constants::ERR_EMPTY_ENVELOPE.to_string(),
        )),
        Some(b'{') => serde_json::from_slice(raw).map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        Some(_) => Packet::deserialize_with_header(raw).map(|(packet, _)| packet),
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("node_id", &self.ctx.node_id)
            .field("coherence_level", &self.ctx.coherence_level())
            .field("sessions", &self.ctx.sessions.len())
            .field("format", &self.format)
            .finish()
    }
}
