//! Observability and Metrics
//!
//! Counters for the covenant router. Each router owns one [`RouterMetrics`]
//! behind an `Arc`, shared with its connection tasks.
//!
//! Uses atomic counters for thread-safe metrics collection.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for routing operations
#[derive(Debug)]
pub struct RouterMetrics {
    /// Packets handed to `route_packet`
    pub packets_routed: AtomicU64,
    /// Frames successfully queued to a destination peer
    pub packets_delivered: AtomicU64,
    /// Packets answered with a returned-to-sender reply
    pub returned_to_sender: AtomicU64,
    /// Healing packets routed with amplification
    pub healing_amplified: AtomicU64,
    /// Routed packets that carried a session id
    pub sessions_bridged: AtomicU64,
    /// Low-coherence packets that still found a route after boosting
    pub dissonance_transmuted: AtomicU64,
    /// Total peers ever registered
    pub peers_connected: AtomicU64,
    /// Peers currently registered
    pub peers_active: AtomicU64,
    /// Peers removed by the heartbeat
    pub peers_evicted: AtomicU64,
    /// Inbound frames that could not be decoded
    pub decode_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl RouterMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_routed: AtomicU64::new(0),
            packets_delivered: AtomicU64::new(0),
            returned_to_sender: AtomicU64::new(0),
            healing_amplified: AtomicU64::new(0),
            sessions_bridged: AtomicU64::new(0),
            dissonance_transmuted: AtomicU64::new(0),
            peers_connected: AtomicU64::new(0),
            peers_active: AtomicU64::new(0),
            peers_evicted: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_routed(&self) {
        self.packets_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packets_delivered(&self, count: u64) {
        self.packets_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn returned_to_sender(&self) {
        self.returned_to_sender.fetch_add(1, Ordering::Relaxed);
    }

    pub fn healing_amplified(&self) {
        self.healing_amplified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_bridged(&self) {
        self.sessions_bridged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dissonance_transmuted(&self) {
        self.dissonance_transmuted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_connected(&self) {
        self.peers_connected.fetch_add(1, Ordering::Relaxed);
        self.peers_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_disconnected(&self) {
        // Saturating: a disconnect racing an eviction must not wrap the gauge
        let _ = self
            .peers_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn peer_evicted(&self) {
        self.peers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            packets_routed: self.packets_routed.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            returned_to_sender: self.returned_to_sender.load(Ordering::Relaxed),
            healing_amplified: self.healing_amplified.load(Ordering::Relaxed),
            sessions_bridged: self.sessions_bridged.load(Ordering::Relaxed),
            dissonance_transmuted: self.dissonance_transmuted.load(Ordering::Relaxed),
            peers_connected: self.peers_connected.load(Ordering::Relaxed),
            peers_active: self.peers_active.load(Ordering::Relaxed),
            peers_evicted: self.peers_evicted.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_routed = snapshot.packets_routed,
            packets_delivered = snapshot.packets_delivered,
            returned_to_sender = snapshot.returned_to_sender,
            healing_amplified = snapshot.healing_amplified,
            sessions_bridged = snapshot.sessions_bridged,
            dissonance_transmuted = snapshot.dissonance_transmuted,
            peers_active = snapshot.peers_active,
            peers_evicted = snapshot.peers_evicted,
            decode_errors = snapshot.decode_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Router metrics snapshot"
        );
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of router metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct RouterMetricsSnapshot {
    pub packets_routed: u64,
    pub packets_delivered: u64,
    pub returned_to_sender: u64,
    pub healing_amplified: u64,
    pub sessions_bridged: u64,
    pub dissonance_transmuted: u64,
    pub peers_connected: u64,
    pub peers_active: u64,
    pub peers_evicted: u64,
    pub decode_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            "Operation completed"
        );
    }
}
