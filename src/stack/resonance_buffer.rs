//! Bounded record of outgoing resonance tags.
//!
//! Entries expire after a TTL and the buffer evicts in FIFO order when full,
//! so memory stays bounded no matter how long a stack runs. The sequence
//! counter lives in the resonance layer, not here: evicting an entry must
//! never make a sequence number repeat.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResonanceRecord {
    pub correlation_id: [u8; 4],
    pub sequence: u64,
    /// Wall-clock time of the send, milliseconds since the epoch
    pub timestamp: u64,
    added_at: Instant,
}

#[derive(Debug)]
pub struct ResonanceBuffer {
    entries: VecDeque<ResonanceRecord>,
    ttl: Duration,
    max_entries: usize,
}

impl ResonanceBuffer {
    pub fn with_settings(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&mut self, correlation_id: [u8; 4], sequence: u64, timestamp: u64) {
        self.cleanup_expired();

        if self.entries.len() >= self.max_entries {
            let to_remove = self.entries.len() - self.max_entries + 1;
            self.entries.drain(..to_remove);
            debug!(removed = to_remove, "Resonance buffer full, oldest entries dropped");
        }

        self.entries.push_back(ResonanceRecord {
            correlation_id,
            sequence,
            timestamp,
            added_at: Instant::now(),
        });
    }

    pub fn find(&self, correlation_id: &[u8]) -> Option<&ResonanceRecord> {
        self.entries
            .iter()
            .rev()
            .find(|r| r.correlation_id.as_slice() == correlation_id && r.added_at.elapsed() < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries are appended in time order, so expired ones are always at the front.
    fn cleanup_expired(&mut self) {
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|front| front.added_at.elapsed() >= self.ttl)
        {
            self.entries.pop_front();
        }
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Cleaned up {} expired resonance entries", removed);
        }
    }
}

impl Default for ResonanceBuffer {
    fn default() -> Self {
        Self::with_settings(Duration::from_secs(300), 1024)
    }
}
