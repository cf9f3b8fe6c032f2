//! Routing policy table and destination selection.
//!
//! Everything here is a pure function of a registry snapshot, so the same
//! snapshot and packet always produce the same selection.

use crate::core::packet::{vector_distance, vector_similarity, Intention, RouteStrategy};
use crate::router::registry::PeerSnapshot;
use std::cmp::Ordering;

/// Peers selected by the healing and inquiry strategies
pub const MULTICAST_FANOUT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingPolicy {
    pub intention: Intention,
    /// Minimum last-reported peer coherence (inclusive)
    pub min_peer_coherence: f64,
    pub strategy: RouteStrategy,
    pub primary_path: &'static str,
    pub backup_paths: [&'static str; 2],
}

const POLICIES: [RoutingPolicy; 5] = [
    RoutingPolicy {
        intention: Intention::Connection,
        min_peer_coherence: 0.4,
        strategy: RouteStrategy::ResonantConnection,
        primary_path: "direct-resonance",
        backup_paths: ["harmony-cascade", "field-bounce"],
    },
    RoutingPolicy {
        intention: Intention::Healing,
        min_peer_coherence: 0.6,
        strategy: RouteStrategy::CoherenceAmplification,
        primary_path: "high-coherence",
        backup_paths: ["compassion-relay", "wisdom-bridge"],
    },
    RoutingPolicy {
        intention: Intention::Inquiry,
        min_peer_coherence: 0.5,
        strategy: RouteStrategy::WisdomGathering,
        primary_path: "wisdom-network",
        backup_paths: ["curiosity-spiral", "wonder-web"],
    },
    RoutingPolicy {
        intention: Intention::Offering,
        min_peer_coherence: 0.4,
        strategy: RouteStrategy::GenerousSharing,
        primary_path: "generosity-flow",
        backup_paths: ["abundance-river", "gift-stream"],
    },
    RoutingPolicy {
        intention: Intention::Completion,
        min_peer_coherence: 0.5,
        strategy: RouteStrategy::ResonantConnection,
        primary_path: "gratitude-return",
        backup_paths: ["blessing-circle", "sacred-close"],
    },
];

/// Policy for an intention; `Unknown` routes like `Connection`.
pub fn policy_for(intention: Intention) -> RoutingPolicy {
    POLICIES
        .iter()
        .find(|p| p.intention == intention)
        .copied()
        .unwrap_or(POLICIES[0])
}

/// Open peers other than `source` whose coherence meets `min_coherence`,
/// highest coherence first, ties in registration order.
pub fn eligible_peers(peers: &[PeerSnapshot], source: &str, min_coherence: f64) -> Vec<PeerSnapshot> {
    let mut eligible: Vec<PeerSnapshot> = peers
        .iter()
        .filter(|p| p.peer_id != source && p.coherence >= min_coherence && p.connection.is_open())
        .cloned()
        .collect();
    eligible.sort_by(|a, b| {
        b.coherence
            .partial_cmp(&a.coherence)
            .unwrap_or(Ordering::Equal)
            .then(a.sequence.cmp(&b.sequence))
    });
    eligible
}

/// The `n` highest-coherence peers. `eligible` must already be sorted.
pub fn select_amplifiers(eligible: &[PeerSnapshot], n: usize) -> Vec<PeerSnapshot> {
    eligible.iter().take(n).cloned().collect()
}

/// Greedy diversity pick: start from the highest-coherence peer, then
/// repeatedly add the peer whose summed field distance to everything already
/// picked is largest. Ties keep the earliest candidate.
pub fn select_diverse(eligible: &[PeerSnapshot], n: usize) -> Vec<PeerSnapshot> {
    let mut candidates: Vec<PeerSnapshot> = eligible.to_vec();
    let mut selected: Vec<PeerSnapshot> = Vec::with_capacity(n);
    if candidates.is_empty() || n == 0 {
        return selected;
    }
    selected.push(candidates.remove(0));

    while selected.len() < n && !candidates.is_empty() {
        let mut best_index = 0;
        let mut best_distance = 0.0;
        for (index, candidate) in candidates.iter().enumerate() {
            let distance: f64 = selected
                .iter()
                .map(|s| vector_distance(&candidate.field_vector, &s.field_vector))
                .sum();
            if distance > best_distance {
                best_distance = distance;
                best_index = index;
            }
        }
        selected.push(candidates.remove(best_index));
    }
    selected
}

/// The peer whose field vector is most similar to `field_vector`; ties and
/// peers with no known field keep the first (highest-coherence) peer.
pub fn select_resonant(eligible: &[PeerSnapshot], field_vector: &[u8]) -> Option<PeerSnapshot> {
    let mut best = eligible.first()?;
    let mut best_similarity = 0.0;
    for peer in eligible {
        if peer.field_vector.is_empty() || field_vector.is_empty() {
            continue;
        }
        let similarity = vector_similarity(field_vector, &peer.field_vector);
        if similarity > best_similarity {
            best_similarity = similarity;
            best = peer;
        }
    }
    Some(best.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::registry::tests::RecordingConnection;
    use std::sync::Arc;

    fn peer(id: &str, coherence: f64, field: u8, sequence: u64) -> PeerSnapshot {
        PeerSnapshot {
            peer_id: id.to_string(),
            coherence,
            field_vector: vec![field; 16],
            sequence,
            connection: Arc::new(RecordingConnection::default()),
        }
    }

    fn ids(peers: &[PeerSnapshot]) -> Vec<&str> {
        peers.iter().map(|p| p.peer_id.as_str()).collect()
    }

    #[test]
    fn test_unknown_uses_connection_policy() {
        assert_eq!(policy_for(Intention::Unknown).min_peer_coherence, 0.4);
        assert_eq!(policy_for(Intention::Healing).min_peer_coherence, 0.6);
        assert_eq!(
            policy_for(Intention::Offering).strategy,
            RouteStrategy::GenerousSharing
        );
    }

    #[test]
    fn test_eligibility_sorted_with_stable_ties() {
        let peers = vec![
            peer("src", 0.99, 0, 0),
            peer("a", 0.7, 0, 1),
            peer("b", 0.9, 0, 2),
            peer("c", 0.7, 0, 3),
            peer("low", 0.2, 0, 4),
        ];
        let eligible = eligible_peers(&peers, "src", 0.4);
        assert_eq!(ids(&eligible), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_closed_peers_skipped() {
        let peers = vec![peer("a", 0.9, 0, 0)];
        peers[0].connection.close();
        assert!(eligible_peers(&peers, "src", 0.0).is_empty());
    }

    #[test]
    fn test_diverse_picks_extremes() {
        let eligible = vec![
            peer("zero", 0.8, 0, 0),
            peer("max", 0.8, 255, 1),
            peer("mid", 0.8, 128, 2),
            peer("low", 0.8, 64, 3),
            peer("high", 0.8, 192, 4),
        ];
        let picked = select_diverse(&eligible, MULTICAST_FANOUT);
        let picked = ids(&picked);
        assert_eq!(picked.len(), 3);
        assert!(picked.contains(&"zero"));
        assert!(picked.contains(&"max"));
    }

    #[test]
    fn test_resonant_prefers_closest_field() {
        let eligible = vec![peer("far", 0.9, 250, 0), peer("near", 0.5, 10, 1)];
        let chosen = select_resonant(&eligible, &[12; 16]).map(|p| p.peer_id);
        assert_eq!(chosen.as_deref(), Some("near"));
    }

    #[test]
    fn test_resonant_without_fields_takes_first() {
        let mut lone = peer("only", 0.9, 0, 0);
        lone.field_vector.clear();
        let chosen = select_resonant(&[lone], &[1; 16]).map(|p| p.peer_id);
        assert_eq!(chosen.as_deref(), Some("only"));
    }
}
