//! # Session Table
//!
//! Sessions known to one stack, keyed by their 32-byte id.
//!
//! A record is created either when this stack starts exchanging under a
//! session (the presence layer counts exchanges) or when the session layer
//! accepts a remote invitation. Records expire after a TTL and the table is
//! bounded; when full, the oldest record is evicted.
//!
//! The table is owned by the stack and only touched through `&mut`, so no
//! locking is involved.

use crate::core::packet::Continuity;
use crate::utils::time::current_timestamp;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How this stack came to know a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// This stack sent packets under the session id
    Initiated,
    /// This stack accepted a remote invitation
    Accepted,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub role: SessionRole,
    /// Sender id of the remote party, once known
    pub remote_node: Option<String>,
    /// Field compatibility at acceptance
    pub compatibility: Option<f64>,
    /// Wall-clock start, milliseconds since the epoch
    pub started_at: u64,
    pub exchange_count: u64,
    created: Instant,
    last_seen: Instant,
}

impl SessionRecord {
    fn new(role: SessionRole) -> Self {
        let now = Instant::now();
        Self {
            role,
            remote_node: None,
            compatibility: None,
            started_at: current_timestamp(),
            exchange_count: 0,
            created: now,
            last_seen: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() > ttl
    }

    pub fn is_established(&self) -> bool {
        self.role == SessionRole::Accepted
    }

    pub fn duration(&self) -> Duration {
        self.created.elapsed()
    }
}

#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<Vec<u8>, SessionRecord>,
    max_entries: usize,
    ttl: Duration,
    total_established: u64,
}

impl SessionTable {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            total_established: 0,
        }
    }

    /// Count one outgoing exchange under `session_id` and report continuity.
    pub fn record_exchange(&mut self, session_id: &[u8]) -> Continuity {
        self.make_room(session_id);
        let record = self
            .sessions
            .entry(session_id.to_vec())
            .or_insert_with(|| SessionRecord::new(SessionRole::Initiated));
        record.exchange_count += 1;
        record.last_seen = Instant::now();
        Continuity {
            session_duration_ms: record.duration().as_millis() as u64,
            exchange_count: record.exchange_count,
        }
    }

    /// Record an accepted invitation. Returns `true` when the session was not
    /// yet established here; accepting the same session again only refreshes it.
    pub fn establish(&mut self, session_id: &[u8], remote_node: &str, compatibility: f64) -> bool {
        self.make_room(session_id);
        let record = self
            .sessions
            .entry(session_id.to_vec())
            .or_insert_with(|| SessionRecord::new(SessionRole::Accepted));
        let newly = record.remote_node.is_none() || record.role != SessionRole::Accepted;
        record.role = SessionRole::Accepted;
        record.remote_node = Some(remote_node.to_string());
        record.compatibility = Some(compatibility);
        record.last_seen = Instant::now();
        if newly {
            self.total_established += 1;
            debug!(session = %hex::encode(session_id), remote = remote_node, "Session established");
        }
        newly
    }

    pub fn get(&self, session_id: &[u8]) -> Option<&SessionRecord> {
        self.sessions
            .get(session_id)
            .filter(|record| !record.is_expired(self.ttl))
    }

    pub fn is_established(&self, session_id: &[u8]) -> bool {
        self.get(session_id).is_some_and(SessionRecord::is_established)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions ever accepted by this stack
    pub fn total_established(&self) -> u64 {
        self.total_established
    }

    pub fn established_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|r| r.is_established() && !r.is_expired(self.ttl))
            .count()
    }

    pub fn clear(&mut self) {
        let count = self.sessions.len();
        self.sessions.clear();
        debug!(cleared_count = count, "Session table cleared");
    }

    /// Evict expired records, then the oldest one if inserting `incoming`
    /// would exceed capacity.
    fn make_room(&mut self, incoming: &[u8]) {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired(ttl));
        if before != self.sessions.len() {
            debug!(
                removed_count = before - self.sessions.len(),
                remaining_count = self.sessions.len(),
                "Expired sessions evicted"
            );
        }

        if self.sessions.contains_key(incoming) || self.sessions.len() < self.max_entries {
            return;
        }
        if let Some(oldest) = self
            .sessions
            .iter()
            .min_by_key(|(_, record)| record.created)
            .map(|(k, _)| k.clone())
        {
            self.sessions.remove(&oldest);
            trace!("Oldest session evicted to make room");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_establish_is_idempotent() {
        let mut table = SessionTable::new(10, Duration::from_secs(60));
        assert!(table.establish(&[1; 32], "remote", 0.8));
        assert!(!table.establish(&[1; 32], "remote", 0.8));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total_established(), 1);
        assert!(table.is_established(&[1; 32]));
    }

    #[test]
    fn test_exchange_count_grows() {
        let mut table = SessionTable::new(10, Duration::from_secs(60));
        assert_eq!(table.record_exchange(&[2; 32]).exchange_count, 1);
        assert_eq!(table.record_exchange(&[2; 32]).exchange_count, 2);
        assert!(!table.is_established(&[2; 32]));
    }

    #[test]
    fn test_capacity_eviction() {
        let mut table = SessionTable::new(3, Duration::from_secs(60));
        for i in 0..5u8 {
            table.record_exchange(&[i; 32]);
        }
        assert_eq!(table.len(), 3);
        assert!(table.get(&[4; 32]).is_some());
    }

    #[test]
    fn test_expired_sessions_hidden() {
        let mut table = SessionTable::new(10, Duration::from_millis(5));
        table.establish(&[3; 32], "remote", 0.9);
        std::thread::sleep(Duration::from_millis(15));
        assert!(!table.is_established(&[3; 32]));
    }
}
