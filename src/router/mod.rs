//! # Covenant Router
//!
//! Selects destination peers for packets by intention and peer coherence.
//!
//! ## Routing
//! `route_packet` runs the same eight steps for every inbound packet:
//! 1. refresh the source peer's record
//! 2. boost a packet below the router's threshold to `(score + router coherence) / 2`
//! 3. look up the policy for the packet's intention
//! 4. filter open, non-source peers meeting the policy's minimum coherence
//! 5. select destinations (amplify, diversify, broadcast or resonate)
//! 6. with no destination, return the packet to its sender
//! 7. annotate the packet for the chosen strategy
//! 8. dispatch, skipping connections that have closed
//!
//! A miss is a normal outcome: the sender gets its packet back with
//! `routing_failed` set and a suggestion. `route_packet` never fails.
//!
//! ## Background work
//! [`Router::run`] drives three ticks next to the transport: harmonization
//! (mean peer coherence broadcast to every peer), heartbeat (stale peers are
//! closed and removed, the rest pinged) and a periodic status log.

pub mod connection;
pub mod policy;
pub mod registry;

pub use connection::{ChannelConnection, PeerConnection};
pub use policy::{policy_for, RoutingPolicy};
pub use registry::{PeerRecord, PeerRegistry, PeerSnapshot, Registration};

use crate::config::{RouterConfig, StackConfig, TransportConfig};
use crate::core::packet::{
    clamp_unit, harmonies, Intention, Packet, RouteStrategy, RoutingAnnotation, RoutingFailure,
};
use crate::error::Result;
use crate::protocol::message::Message;
use crate::stack::{SendOptions, Stack};
use crate::utils::metrics::{RouterMetrics, RouterMetricsSnapshot, Timer};
use crate::utils::time::current_timestamp;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Coherence scale applied to healing packets
const HEALING_AMPLIFICATION: f64 = 1.1;
/// Network coherence assumed when no peer is connected
const EMPTY_NETWORK_COHERENCE: f64 = 0.5;
const NO_ROUTE_REASON: &str = "No coherent path available";
const NO_ROUTE_SUGGESTION: &str = "Consider raising coherence or trying a different intention";
const OFFERING_NOTE: &str = "Shared with love from the router";
const WELCOME_MESSAGE: &str = "Welcome to the network. May your packets flow with coherence.";

/// Result of one `route_packet` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Delivered {
        strategy: RouteStrategy,
        /// Peers selected, in selection order
        selected: Vec<String>,
        /// Peers the packet was actually queued to
        delivered: usize,
    },
    ReturnedToSender {
        reason: String,
        suggestion: String,
        /// Whether the reply reached the source connection
        notified: bool,
    },
}

impl RouteOutcome {
    /// Number of successful deliveries; zero for a returned packet.
    pub fn delivered(&self) -> usize {
        match self {
            RouteOutcome::Delivered { delivered, .. } => *delivered,
            RouteOutcome::ReturnedToSender { .. } => 0,
        }
    }

    pub fn is_returned(&self) -> bool {
        matches!(self, RouteOutcome::ReturnedToSender { .. })
    }
}

/// Field state computed by one harmonization tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Harmonization {
    pub network_coherence: f64,
    pub router_coherence: f64,
    pub peer_count: usize,
    pub notified: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub router_id: String,
    pub uptime_ms: u64,
    pub connected_peers: usize,
    pub router_coherence: f64,
    pub metrics: RouterMetricsSnapshot,
    pub active_sessions: usize,
}

pub struct Router {
    id: String,
    config: RouterConfig,
    stack: Mutex<Stack>,
    registry: PeerRegistry,
    metrics: Arc<RouterMetrics>,
    started_at: Instant,
}

impl Router {
    pub fn new(config: RouterConfig, stack_config: &StackConfig) -> Self {
        let id = config
            .router_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut stack_config = stack_config.clone();
        stack_config.node_id = Some(format!("router-{id}"));
        stack_config.coherence_level = config.router_coherence;
        Self {
            id,
            stack: Mutex::new(Stack::new(&stack_config)),
            registry: PeerRegistry::with_capacity(config.max_peers),
            config,
            metrics: Arc::new(RouterMetrics::new()),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    pub async fn coherence(&self) -> f64 {
        self.stack.lock().await.coherence_level()
    }

    pub async fn set_coherence(&self, value: f64) {
        self.stack.lock().await.set_coherence_level(value);
    }

    /// Register a newly connected peer and greet it with a welcome packet
    /// from the router's own stack. Unknown ids are always accepted.
    ///
    /// Returns the registration sequence to pass back to [`Router::disconnect`],
    /// or `None` (and closes `connection`) when the router is full.
    #[instrument(skip(self, connection), fields(router = %self.id))]
    pub async fn accept_peer(&self, peer_id: &str, connection: Arc<dyn PeerConnection>) -> Option<u64> {
        let Some(registration) = self.registry.register(peer_id, connection.clone()) else {
            warn!(peer = peer_id, max_peers = self.config.max_peers, "Peer limit reached, refusing peer");
            connection.close();
            return None;
        };
        self.metrics.peer_connected();
        if registration.replaced {
            // The replaced connection leaves the active gauge
            self.metrics.peer_disconnected();
        }
        info!(peer = peer_id, replaced = registration.replaced, "Peer connected");

        let welcome = {
            let mut stack = self.stack.lock().await;
            let payload = json!({
                "type": "router-welcome",
                "router_id": self.id,
                "node_id": peer_id,
                "field_vector": hex::encode(stack.field_vector()),
                "message": WELCOME_MESSAGE,
            });
            let options = SendOptions {
                harmonies: Some(harmonies::COHERENCE | harmonies::RESONANCE | harmonies::MUTUALITY),
                ..SendOptions::with_intention(Intention::Connection)
            };
            stack.send(payload, options).await
        };
        if let Err(e) = connection.send(Message::packet(welcome)) {
            warn!(peer = peer_id, error = %e, "Failed to send welcome packet");
        }
        Some(registration.sequence)
    }

    /// Forget a peer. A stale `sequence` (the id was re-registered since) is ignored.
    pub fn disconnect(&self, peer_id: &str, sequence: u64) {
        if let Some(record) = self.registry.remove_if(peer_id, sequence) {
            record.connection.close();
            self.metrics.peer_disconnected();
            info!(peer = peer_id, "Peer disconnected");
        }
    }

    /// Handle one decoded message from `peer_id`.
    pub async fn handle_message(&self, peer_id: &str, message: Message) {
        match message {
            Message::Packet(packet) => {
                self.route_packet(*packet, peer_id).await;
            }
            Message::Ping { timestamp } => {
                self.registry.touch(peer_id);
                if let Some(connection) = self.registry.connection(peer_id) {
                    let _ = connection.send(Message::Pong { timestamp });
                }
            }
            Message::Pong { .. } | Message::Hello { .. } => self.registry.touch(peer_id),
            Message::Harmonization { .. } => {
                debug!(peer = peer_id, "Ignoring harmonization from a peer");
            }
        }
    }

    /// Route one packet from `source`. Never fails.
    #[instrument(skip(self, packet), fields(router = %self.id))]
    pub async fn route_packet(&self, mut packet: Packet, source: &str) -> RouteOutcome {
        let _timer = Timer::start("route_packet");
        self.metrics.packet_routed();

        // 1. source record
        packet.set_coherence(packet.coherence_score);
        self.registry
            .observe_packet(source, packet.coherence_score, &packet.field_vector);

        // 2. boost, persisted into the packet
        let original_score = packet.coherence_score;
        let boosted = original_score < self.config.coherence_threshold;
        if boosted {
            let router_coherence = self.coherence().await;
            packet.set_coherence((original_score + router_coherence) / 2.0);
            debug!(from = original_score, to = packet.coherence_score, "Coherence boosted");
        }

        // 3. policy
        let intention = packet.intention();
        let policy = policy_for(intention);

        // 4. eligibility
        let eligible = policy::eligible_peers(
            &self.registry.snapshot(),
            source,
            policy.min_peer_coherence,
        );

        // 5. selection
        let selected = match policy.strategy {
            RouteStrategy::CoherenceAmplification => {
                policy::select_amplifiers(&eligible, policy::MULTICAST_FANOUT)
            }
            RouteStrategy::WisdomGathering => policy::select_diverse(&eligible, policy::MULTICAST_FANOUT),
            RouteStrategy::GenerousSharing => eligible,
            RouteStrategy::ResonantConnection => policy::select_resonant(&eligible, &packet.field_vector)
                .into_iter()
                .collect(),
        };

        // 6. no route
        if selected.is_empty() {
            return self.return_to_sender(packet, source, intention, policy.min_peer_coherence);
        }

        // 7. annotations
        packet.metadata.hop_count = packet.metadata.hop_count.saturating_add(1);
        let mut annotation = RoutingAnnotation {
            router_id: self.id.clone(),
            strategy: policy.strategy,
            timestamp: current_timestamp(),
            boosted_from: boosted.then_some(original_score),
            amplified: false,
            inquiry_accumulator: None,
            note: None,
        };
        match policy.strategy {
            RouteStrategy::CoherenceAmplification => {
                annotation.amplified = true;
                packet.set_coherence(clamp_unit(packet.coherence_score * HEALING_AMPLIFICATION));
            }
            RouteStrategy::WisdomGathering => annotation.inquiry_accumulator = Some(Vec::new()),
            RouteStrategy::GenerousSharing => annotation.note = Some(OFFERING_NOTE.to_string()),
            RouteStrategy::ResonantConnection => {}
        }
        packet.routing = Some(annotation);

        // 8. dispatch
        let selected_ids: Vec<String> = selected.iter().map(|p| p.peer_id.clone()).collect();
        let mut delivered = 0;
        for peer in &selected {
            if !peer.connection.is_open() {
                debug!(peer = %peer.peer_id, "Skipping closed connection");
                continue;
            }
            match peer.connection.send(Message::packet(packet.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(peer = %peer.peer_id, error = %e, "Delivery failed"),
            }
        }

        self.metrics.packets_delivered(delivered as u64);
        if intention == Intention::Healing {
            self.metrics.healing_amplified();
        }
        if packet.session_id.is_some() {
            self.metrics.session_bridged();
        }
        if boosted {
            self.metrics.dissonance_transmuted();
        }
        info!(
            strategy = policy.strategy.as_str(),
            %intention,
            selected = selected_ids.len(),
            delivered,
            "Packet routed"
        );

        RouteOutcome::Delivered {
            strategy: policy.strategy,
            selected: selected_ids,
            delivered,
        }
    }

    fn return_to_sender(
        &self,
        mut packet: Packet,
        source: &str,
        intention: Intention,
        min_coherence: f64,
    ) -> RouteOutcome {
        let reason = format!(
            "{NO_ROUTE_REASON} for {intention} intention (needs peer coherence >= {min_coherence})"
        );
        packet.routing_failed = true;
        packet.routing_failure = Some(RoutingFailure {
            reason: reason.clone(),
            suggestion: NO_ROUTE_SUGGESTION.to_string(),
        });

        let notified = match self.registry.connection(source) {
            Some(connection) if connection.is_open() => connection.send(Message::packet(packet)).is_ok(),
            _ => false,
        };
        self.metrics.returned_to_sender();
        info!(%intention, notified, "No coherent route, packet returned to sender");

        RouteOutcome::ReturnedToSender {
            reason,
            suggestion: NO_ROUTE_SUGGESTION.to_string(),
            notified,
        }
    }

    /// Fold the network's mean coherence into the router's own and broadcast
    /// the result to every open peer.
    #[instrument(skip(self), fields(router = %self.id))]
    pub async fn harmonize_field(&self) -> Harmonization {
        let peer_count = self.registry.len();
        let network_coherence = self
            .registry
            .mean_coherence()
            .unwrap_or(EMPTY_NETWORK_COHERENCE);

        let router_coherence = {
            let mut stack = self.stack.lock().await;
            let updated = (stack.coherence_level() + network_coherence) / 2.0;
            stack.set_coherence_level(updated);
            stack.coherence_level()
        };

        let message = Message::Harmonization {
            router_id: self.id.clone(),
            field_coherence: network_coherence,
            router_coherence,
            peer_count,
            timestamp: current_timestamp(),
        };
        let notified = self
            .registry
            .snapshot()
            .iter()
            .filter(|p| p.connection.is_open())
            .filter(|p| p.connection.send(message.clone()).is_ok())
            .count();

        info!(network_coherence, router_coherence, peer_count, "Field harmonized");
        Harmonization {
            network_coherence,
            router_coherence,
            peer_count,
            notified,
        }
    }

    /// Heartbeat tick evaluated at `now`: close and remove peers not seen
    /// within the peer timeout, ping the rest. Returns the evicted ids.
    pub fn evict_stale_at(&self, now: Instant) -> Vec<String> {
        let evicted = self.registry.evict_stale(now, self.config.peer_timeout);
        for record in &evicted {
            record.connection.close();
            self.metrics.peer_evicted();
            self.metrics.peer_disconnected();
            warn!(peer = %record.peer_id, "Peer timed out, connection closed");
        }

        for peer in self.registry.snapshot() {
            if peer.connection.is_open() {
                if let Err(e) = peer.connection.ping() {
                    debug!(peer = %peer.peer_id, error = %e, "Ping failed");
                }
            }
        }

        evicted.into_iter().map(|r| r.peer_id).collect()
    }

    pub fn heartbeat(&self) -> Vec<String> {
        self.evict_stale_at(Instant::now())
    }

    pub async fn status(&self) -> RouterStatus {
        let (router_coherence, active_sessions) = {
            let stack = self.stack.lock().await;
            (stack.coherence_level(), stack.sessions().established_count())
        };
        RouterStatus {
            router_id: self.id.clone(),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            connected_peers: self.registry.len(),
            router_coherence,
            metrics: self.metrics.snapshot(),
            active_sessions,
        }
    }

    /// Drive the periodic ticks until `shutdown` is cancelled.
    pub async fn run_ticks(self: Arc<Self>, shutdown: CancellationToken) {
        let mut harmonize = tokio::time::interval(self.config.harmonize_interval);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut status = tokio::time::interval(self.config.status_interval);
        // The first tick of an interval fires immediately
        harmonize.tick().await;
        heartbeat.tick().await;
        status.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = harmonize.tick() => {
                    self.harmonize_field().await;
                }
                _ = heartbeat.tick() => {
                    self.heartbeat();
                }
                _ = status.tick() => {
                    let status = self.status().await;
                    info!(
                        connected_peers = status.connected_peers,
                        router_coherence = status.router_coherence,
                        active_sessions = status.active_sessions,
                        "Router status"
                    );
                    self.metrics.log_metrics();
                }
            }
        }
        debug!("Router ticks stopped");
    }

    /// Serve peers on the configured address and drive the ticks until
    /// `shutdown_rx` fires.
    pub async fn run(self: Arc<Self>, transport: TransportConfig, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.address).await?;
        self.serve(listener, transport, shutdown_rx).await
    }

    /// Like [`Router::run`] on an already bound listener.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        transport: TransportConfig,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!(
            router = %self.id,
            address = ?listener.local_addr().ok(),
            threshold = self.config.coherence_threshold,
            "Covenant router started"
        );
        let ticks_stop = CancellationToken::new();
        let ticks = tokio::spawn(self.clone().run_ticks(ticks_stop.clone()));

        let served =
            crate::transport::tcp::start_server_with_shutdown(listener, self.clone(), transport, shutdown_rx).await;

        ticks_stop.cancel();
        let _ = ticks.await;
        info!(router = %self.id, "Covenant router stopped");
        served
    }

    /// Close every peer connection.
    pub fn close_all(&self) {
        for peer in self.registry.snapshot() {
            peer.connection.close();
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("peers", &self.registry.len())
            .field("coherence_threshold", &self.config.coherence_threshold)
            .finish()
    }
}
