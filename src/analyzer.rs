//! # Packet Analyzer
//!
//! Headless inspection of packets: a per-layer report, warnings and notes for
//! a single packet, and a bounded capture log with an aggregate view of the
//! field.
//!
//! ```rust
//! use luminous_stack::analyzer::PacketAnalyzer;
//! use luminous_stack::config::StackConfig;
//! use luminous_stack::stack::{SendOptions, Stack};
//! use serde_json::json;
//!
//! # async fn demo() {
//! let mut stack = Stack::new(&StackConfig::default());
//! let packet = stack.send(json!("hello"), SendOptions::default()).await;
//!
//! let mut analyzer = PacketAnalyzer::new(stack.field_vector().to_vec());
//! let capture = analyzer.capture(&packet);
//! println!("{}", capture.analysis);
//! # }
//! ```

use crate::core::packet::{vector_similarity, Intention, Packet, SessionPhase};
use crate::utils::time::current_timestamp;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Captures kept by default
pub const DEFAULT_CAPTURE_CAPACITY: usize = 100;

pub const WARN_LOW_COHERENCE: &str = "Low coherence detected";
pub const WARN_FIELD_DISSONANCE: &str = "Field dissonance present";
pub const NOTE_HEALING: &str = "Healing intention detected";

const LOW_COHERENCE: f64 = 0.3;
const DISSONANT_COMPATIBILITY: f64 = 0.5;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_SAMPLES: usize = 16;
const PREVIEW_HEX_CHARS: usize = 16;
const PREVIEW_TEXT_CHARS: usize = 50;

/// One layer's findings, as ordered key/value lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer: u8,
    pub name: &'static str,
    pub details: Vec<(&'static str, String)>,
}

impl LayerReport {
    fn new(layer: u8, name: &'static str) -> Self {
        Self {
            layer,
            name,
            details: Vec::new(),
        }
    }

    fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.details.push((key, value.to_string()));
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketAnalysis {
    /// Reports for the layers that left a trace, in layer order
    pub layers: Vec<LayerReport>,
    pub coherence_score: f64,
    /// Compatibility computed by a receiving field layer, when there was one
    pub field_compatibility: Option<f64>,
    pub intention: Intention,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl PacketAnalysis {
    pub fn layer(&self, index: u8) -> Option<&LayerReport> {
        self.layers.iter().find(|l| l.layer == index)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// One-line summary, as used in capture listings.
    pub fn summary_line(&self) -> String {
        let flag = if self.has_warnings() { '!' } else { ' ' };
        let note = if self.notes.is_empty() { ' ' } else { '*' };
        format!(
            "{flag}{note} {:>3}% | {}",
            (self.coherence_score * 100.0).round() as i64,
            self.intention
        )
    }
}

impl fmt::Display for PacketAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== LAYER ANALYSIS ===")?;
        for layer in &self.layers {
            writeln!(f, "Layer {}: {}", layer.layer, layer.name)?;
            for (key, value) in &layer.details {
                writeln!(f, "  {key}: {value}")?;
            }
        }
        writeln!(f, "=== COHERENCE ANALYSIS ===")?;
        writeln!(f, "Coherence Score: {:.1}%", self.coherence_score * 100.0)?;
        match self.field_compatibility {
            Some(c) => writeln!(f, "Field Compatibility: {:.1}%", c * 100.0)?,
            None => writeln!(f, "Field Compatibility: n/a")?,
        }
        if !self.warnings.is_empty() {
            writeln!(f, "=== WARNINGS ===")?;
            for warning in &self.warnings {
                writeln!(f, "! {warning}")?;
            }
        }
        if !self.notes.is_empty() {
            writeln!(f, "=== NOTES ===")?;
            for note in &self.notes {
                writeln!(f, "* {note}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
    /// 1-based, increasing across the analyzer's lifetime
    pub id: u64,
    pub captured_at: u64,
    pub analysis: PacketAnalysis,
}

/// Aggregate over every capture currently held.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub packets: usize,
    pub mean_coherence: f64,
    /// Most frequent intention; ties go to the one seen first
    pub dominant_intention: Intention,
    pub unique_warnings: BTreeSet<String>,
}

impl fmt::Display for FieldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Field Analysis: {:.1}% coherence, dominant intention: {}, {} unique warnings",
            self.mean_coherence * 100.0,
            self.dominant_intention,
            self.unique_warnings.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct PacketAnalyzer {
    /// Field vector resonance is measured against
    reference_field: Vec<u8>,
    /// Newest first
    captures: VecDeque<Capture>,
    capacity: usize,
    next_id: u64,
}

impl PacketAnalyzer {
    pub fn new(reference_field: Vec<u8>) -> Self {
        Self::with_capacity(reference_field, DEFAULT_CAPTURE_CAPACITY)
    }

    pub fn with_capacity(reference_field: Vec<u8>, capacity: usize) -> Self {
        Self {
            reference_field,
            captures: VecDeque::with_capacity(capacity.min(DEFAULT_CAPTURE_CAPACITY)),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn analyze(&self, packet: &Packet) -> PacketAnalysis {
        let mut layers = Vec::new();

        if !packet.origin_signature.is_empty() {
            layers.push(
                LayerReport::new(0, "origin")
                    .with("signature", hex_preview(&packet.origin_signature))
                    .with("spread", format!("{:.3}", signature_spread(&packet.origin_signature))),
            );
        }

        if !packet.field_vector.is_empty() {
            layers.push(
                LayerReport::new(1, "field")
                    .with("state", sparkline(&packet.field_vector))
                    .with(
                        "resonance",
                        format!("{:.3}", vector_similarity(&packet.field_vector, &self.reference_field)),
                    ),
            );
        }

        if let Some(session_id) = &packet.session_id {
            let trust = match packet.session_phase {
                SessionPhase::Initiating => "building",
                _ => "established",
            };
            layers.push(
                LayerReport::new(2, "session")
                    .with("id", hex_preview(session_id))
                    .with("phase", format!("{:?}", packet.session_phase).to_lowercase())
                    .with("trust", trust),
            );
        }

        let intention = packet.intention();
        if !packet.intention_vector.is_empty() {
            layers.push(
                LayerReport::new(3, "intention")
                    .with("pattern", intention_pattern(&packet.intention_vector))
                    .with("decoded", intention)
                    .with("purity", format!("{:.3}", intention_purity(&packet.intention_vector))),
            );
        }

        if let Some(tag) = &packet.resonance {
            let mut report = LayerReport::new(4, "resonance")
                .with("id", hex::encode(&tag.correlation_id))
                .with("sequence", tag.sequence)
                .with("coherence", format!("{:.3}", packet.field_coherence.unwrap_or(0.0)));
            if packet.needs_resonance_repair {
                report = report.with("repair", "requested");
            }
            layers.push(report);
        }

        if let Some(envelope) = &packet.presence {
            let mut report = LayerReport::new(5, "presence")
                .with("captured", true)
                .with("coherence", format!("{:.3}", envelope.snapshot.coherence));
            if let Some(continuity) = &envelope.continuity {
                report = report.with("exchanges", continuity.exchange_count).with(
                    "session_duration_ms",
                    continuity.session_duration_ms,
                );
            }
            layers.push(report);
        } else if let Some(integration) = &packet.integrated_presence {
            layers.push(
                LayerReport::new(5, "presence")
                    .with("integrated", true)
                    .with(
                        "coherence",
                        format!(
                            "{:.3} -> {:.3}",
                            integration.previous_coherence, integration.new_coherence
                        ),
                    ),
            );
        }

        if let Some(meaning) = &packet.encoded_meaning {
            layers.push(
                LayerReport::new(6, "meaning")
                    .with("dimensions", "text, energetic, symbolic, harmonic")
                    .with("primary", text_preview(&meaning.text))
                    .with("harmonic", format!("{:.0}Hz", meaning.harmonic.root)),
            );
        } else if let Some(meaning) = &packet.decoded_meaning {
            layers.push(
                LayerReport::new(6, "meaning")
                    .with("primary", text_preview(&meaning.text))
                    .with("feeling", &meaning.feeling)
                    .with("symbol", &meaning.symbol),
            );
        }

        if let Some(finalized) = packet.finalized {
            layers.push(
                LayerReport::new(7, "embodiment")
                    .with("integrated", true)
                    .with("finalized", format!("{finalized:?}").to_lowercase()),
            );
        }

        let mut warnings = Vec::new();
        if packet.coherence_score < LOW_COHERENCE {
            warnings.push(WARN_LOW_COHERENCE.to_string());
        }
        if packet
            .field_compatibility
            .is_some_and(|c| c < DISSONANT_COMPATIBILITY)
        {
            warnings.push(WARN_FIELD_DISSONANCE.to_string());
        }

        let mut notes = Vec::new();
        if intention == Intention::Healing {
            notes.push(NOTE_HEALING.to_string());
        }
        let annotation = packet.text_annotation.trim();
        if !annotation.is_empty() {
            notes.push(annotation.to_string());
        }

        PacketAnalysis {
            layers,
            coherence_score: packet.coherence_score,
            field_compatibility: packet.field_compatibility,
            intention,
            warnings,
            notes,
        }
    }

    /// Analyze and record a packet, dropping the oldest capture when full.
    pub fn capture(&mut self, packet: &Packet) -> &Capture {
        let capture = Capture {
            id: self.next_id,
            captured_at: current_timestamp(),
            analysis: self.analyze(packet),
        };
        self.next_id += 1;
        self.captures.push_front(capture);
        self.captures.truncate(self.capacity);
        &self.captures[0]
    }

    /// Captures, newest first.
    pub fn captures(&self) -> impl Iterator<Item = &Capture> {
        self.captures.iter()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn clear(&mut self) {
        self.captures.clear();
    }

    /// `None` with nothing captured.
    pub fn summary(&self) -> Option<FieldSummary> {
        if self.captures.is_empty() {
            return None;
        }
        let total: f64 = self.captures.iter().map(|c| c.analysis.coherence_score).sum();

        // Oldest first, so ties resolve to the earliest intention
        let mut counts: Vec<(Intention, usize)> = Vec::new();
        for capture in self.captures.iter().rev() {
            let intention = capture.analysis.intention;
            match counts.iter_mut().find(|(i, _)| *i == intention) {
                Some((_, n)) => *n += 1,
                None => counts.push((intention, 1)),
            }
        }
        let mut dominant = counts[0];
        for entry in &counts[1..] {
            if entry.1 > dominant.1 {
                dominant = *entry;
            }
        }

        let unique_warnings = self
            .captures
            .iter()
            .flat_map(|c| c.analysis.warnings.iter().cloned())
            .collect();

        Some(FieldSummary {
            packets: self.captures.len(),
            mean_coherence: total / self.captures.len() as f64,
            dominant_intention: dominant.0,
            unique_warnings,
        })
    }
}

/// Mean distance of each byte from the midpoint, scaled to [0, 1].
pub fn signature_spread(signature: &[u8]) -> f64 {
    if signature.is_empty() {
        return 0.0;
    }
    let total: f64 = signature
        .iter()
        .map(|b| (f64::from(*b) - 128.0).abs())
        .sum();
    total / signature.len() as f64 / 128.0
}

/// Up to sixteen evenly spaced samples of the vector drawn as block heights.
pub fn sparkline(vector: &[u8]) -> String {
    if vector.is_empty() {
        return String::new();
    }
    let step = (vector.len() / SPARK_SAMPLES).max(1);
    vector
        .iter()
        .step_by(step)
        .take(SPARK_SAMPLES)
        .map(|v| SPARK_LEVELS[usize::from(*v / 32)])
        .collect()
}

/// How focused the first eight bytes are: `1 - variance / 16384`.
pub fn intention_purity(vector: &[u8]) -> f64 {
    let head = &vector[..vector.len().min(8)];
    if head.is_empty() {
        return 0.0;
    }
    let n = head.len() as f64;
    let mean = head.iter().map(|b| f64::from(*b)).sum::<f64>() / n;
    let variance = head
        .iter()
        .map(|b| (f64::from(*b) - mean).powi(2))
        .sum::<f64>()
        / n;
    1.0 - variance / 16384.0
}

fn intention_pattern(vector: &[u8]) -> String {
    vector
        .iter()
        .take(8)
        .map(|b| if *b > 128 { '◉' } else { '○' })
        .collect()
}

fn hex_preview(bytes: &[u8]) -> String {
    let encoded = hex::encode(bytes);
    if encoded.len() > PREVIEW_HEX_CHARS {
        format!("{}...", &encoded[..PREVIEW_HEX_CHARS])
    } else {
        encoded
    }
}

fn text_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_TEXT_CHARS {
        let head: String = text.chars().take(PREVIEW_TEXT_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
