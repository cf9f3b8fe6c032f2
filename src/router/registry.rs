//! Peer registry.
//!
//! One mutex guards every mutation: accept, inbound message, disconnect and
//! heartbeat. The lock is never held across an await point.

use crate::router::connection::PeerConnection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Coherence assumed for a peer that has not sent anything yet
pub const INITIAL_PEER_COHERENCE: f64 = 0.5;

#[derive(Debug)]
pub struct PeerRecord {
    pub peer_id: String,
    pub connection: Arc<dyn PeerConnection>,
    pub coherence: f64,
    pub last_field_vector: Vec<u8>,
    pub connected_at: Instant,
    pub last_seen_at: Instant,
    pub packets_routed: u64,
    /// Registration order, used to break coherence ties
    pub sequence: u64,
}

/// Point-in-time copy of the routing-relevant part of a record.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub peer_id: String,
    pub coherence: f64,
    pub field_vector: Vec<u8>,
    pub sequence: u64,
    pub connection: Arc<dyn PeerConnection>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    peers: HashMap<String, PeerRecord>,
    next_sequence: u64,
}

/// A connection accepted by [`PeerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub sequence: u64,
    /// An earlier connection under the same id was closed and replaced
    pub replaced: bool,
}

#[derive(Debug)]
pub struct PeerRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::with_capacity(usize::MAX)
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding at most `capacity` distinct peer ids.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panic elsewhere must not take routing down with it
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("{}", crate::error::constants::ERR_REGISTRY_LOCK);
            poisoned.into_inner()
        })
    }

    /// Register a peer, replacing (and closing) any previous connection under
    /// the same id. The returned sequence identifies this particular
    /// connection in [`PeerRegistry::remove_if`].
    ///
    /// Returns `None` when a new id would exceed the capacity. The check and
    /// the insert happen under one lock.
    pub fn register(&self, peer_id: &str, connection: Arc<dyn PeerConnection>) -> Option<Registration> {
        let mut inner = self.lock();
        if !inner.peers.contains_key(peer_id) && inner.peers.len() >= self.capacity {
            return None;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let now = Instant::now();
        let record = PeerRecord {
            peer_id: peer_id.to_string(),
            connection,
            coherence: INITIAL_PEER_COHERENCE,
            last_field_vector: Vec::new(),
            connected_at: now,
            last_seen_at: now,
            packets_routed: 0,
            sequence,
        };
        let replaced = match inner.peers.insert(peer_id.to_string(), record) {
            Some(previous) => {
                debug!(peer = peer_id, "Peer id reused, closing previous connection");
                previous.connection.close();
                true
            }
            None => false,
        };
        Some(Registration { sequence, replaced })
    }

    /// Record an inbound packet from `peer_id`. Returns false for unknown peers.
    pub fn observe_packet(&self, peer_id: &str, coherence: f64, field_vector: &[u8]) -> bool {
        let mut inner = self.lock();
        match inner.peers.get_mut(peer_id) {
            Some(record) => {
                record.coherence = coherence;
                if !field_vector.is_empty() {
                    record.last_field_vector = field_vector.to_vec();
                }
                record.packets_routed += 1;
                record.last_seen_at = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Refresh `last_seen_at` (pong, ping, hello).
    pub fn touch(&self, peer_id: &str) {
        if let Some(record) = self.lock().peers.get_mut(peer_id) {
            record.last_seen_at = Instant::now();
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, peer_id: &str, by: Duration) {
        if let Some(record) = self.lock().peers.get_mut(peer_id) {
            if let Some(earlier) = record.last_seen_at.checked_sub(by) {
                record.last_seen_at = earlier;
            }
        }
    }

    /// Remove the peer only if it is still the registration `sequence`.
    pub fn remove_if(&self, peer_id: &str, sequence: u64) -> Option<PeerRecord> {
        let mut inner = self.lock();
        if inner.peers.get(peer_id).is_some_and(|r| r.sequence == sequence) {
            inner.peers.remove(peer_id)
        } else {
            None
        }
    }

    pub fn remove(&self, peer_id: &str) -> Option<PeerRecord> {
        self.lock().peers.remove(peer_id)
    }

    pub fn connection(&self, peer_id: &str) -> Option<Arc<dyn PeerConnection>> {
        self.lock().peers.get(peer_id).map(|r| r.connection.clone())
    }

    pub fn coherence(&self, peer_id: &str) -> Option<f64> {
        self.lock().peers.get(peer_id).map(|r| r.coherence)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.lock().peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    /// All peers, in registration order.
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let inner = self.lock();
        let mut peers: Vec<PeerSnapshot> = inner
            .peers
            .values()
            .map(|r| PeerSnapshot {
                peer_id: r.peer_id.clone(),
                coherence: r.coherence,
                field_vector: r.last_field_vector.clone(),
                sequence: r.sequence,
                connection: r.connection.clone(),
            })
            .collect();
        peers.sort_by_key(|p| p.sequence);
        peers
    }

    /// Mean coherence of all registered peers, or `None` with no peers.
    pub fn mean_coherence(&self) -> Option<f64> {
        let inner = self.lock();
        if inner.peers.is_empty() {
            return None;
        }
        let total: f64 = inner.peers.values().map(|r| r.coherence).sum();
        Some(total / inner.peers.len() as f64)
    }

    /// Remove every peer not seen within `timeout` of `now`. Removal happens
    /// under the lock, so each stale peer is returned exactly once.
    pub fn evict_stale(&self, now: Instant, timeout: Duration) -> Vec<PeerRecord> {
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .peers
            .values()
            .filter(|r| now.saturating_duration_since(r.last_seen_at) > timeout)
            .map(|r| r.peer_id.clone())
            .collect();
        let mut evicted: Vec<PeerRecord> = stale
            .iter()
            .filter_map(|id| inner.peers.remove(id))
            .collect();
        evicted.sort_by_key(|r| r.sequence);
        evicted
    }
}
