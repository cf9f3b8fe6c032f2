//! The eight pipeline layers, in table order.
//!
//! | # | Layer | Outgoing | Incoming |
//! |---|-------|----------|----------|
//! | 0 | Origin | sign | reject missing/mis-sized signatures |
//! | 1 | Field | blend field vector | reject dissonant fields |
//! | 2 | Session | mint session id | accept invitations |
//! | 3 | Intention | attach routing hint | decode intention |
//! | 4 | Resonance | tag and sequence | flag repairs, field coherence |
//! | 5 | Presence | wrap payload | integrate remote coherence |
//! | 6 | Meaning | encode representations | decode representations |
//! | 7 | Embodiment | finalize, announce | finalize, announce |

mod embodiment;
mod field;
mod intention;
mod meaning;
mod origin;
mod presence;
mod resonance;
mod session;

pub use embodiment::EmbodimentLayer;
pub use field::FieldLayer;
pub use intention::IntentionLayer;
pub use meaning::MeaningLayer;
pub use origin::OriginLayer;
pub use presence::PresenceLayer;
pub use resonance::ResonanceLayer;
pub use session::SessionLayer;

use crate::config::StackConfig;
use crate::stack::layer::Layer;

/// Number of layers in every stack
pub const LAYER_COUNT: usize = 8;

/// Build the fixed layer table, index 0 first.
pub fn default_layers(config: &StackConfig) -> Vec<Box<dyn Layer>> {
    vec![
        Box::new(OriginLayer),
        Box::new(FieldLayer),
        Box::new(SessionLayer),
        Box::new(IntentionLayer),
        Box::new(ResonanceLayer::new(
            config.resonance_ttl,
            config.resonance_buffer_capacity,
        )),
        Box::new(PresenceLayer),
        Box::new(MeaningLayer),
        Box::new(EmbodimentLayer),
    ]
}
