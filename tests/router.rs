//! Covenant router routing behavior against in-memory peers.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{outgoing, stack_with_field, RecordingPeer};
use luminous_stack::config::{RouterConfig, StackConfig};
use luminous_stack::core::packet::{Intention, RouteStrategy};
use luminous_stack::protocol::Message;
use luminous_stack::router::{PeerConnection, RouteOutcome, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn router(threshold: f64, own: f64) -> Router {
    let config = RouterConfig {
        router_id: Some("test-router".into()),
        coherence_threshold: threshold,
        router_coherence: own,
        ..RouterConfig::default()
    };
    Router::new(config, &StackConfig::default())
}

/// Register `peers` as `(id, coherence, field byte)` and return their connections.
async fn populate(router: &Router, peers: &[(&str, f64, u8)]) -> Vec<Arc<RecordingPeer>> {
    let mut connections = Vec::new();
    for (id, coherence, field) in peers {
        let conn = RecordingPeer::new();
        router.accept_peer(id, conn.clone()).await;
        router.registry().observe_packet(id, *coherence, &[*field; 16]);
        connections.push(conn);
    }
    connections
}

fn selected(outcome: &RouteOutcome) -> Vec<&str> {
    match outcome {
        RouteOutcome::Delivered { selected, .. } => selected.iter().map(String::as_str).collect(),
        RouteOutcome::ReturnedToSender { .. } => Vec::new(),
    }
}

#[tokio::test]
async fn test_healing_amplifies_to_top_three() {
    let router = router(0.3, 0.8);
    let conns = populate(
        &router,
        &[
            ("source", 0.99, 0),
            ("a", 0.65, 0),
            ("b", 0.9, 0),
            ("c", 0.7, 0),
            ("d", 0.8, 0),
            ("low", 0.5, 0),
        ],
    )
    .await;

    let mut stack = stack_with_field(0, 0.5);
    let packet = outgoing(&mut stack, json!("mend"), Intention::Healing).await;

    let first = router.route_packet(packet.clone(), "source").await;
    let second = router.route_packet(packet, "source").await;

    assert_eq!(selected(&first), vec!["b", "d", "c"]);
    assert_eq!(selected(&first), selected(&second));
    assert_eq!(first.delivered(), 3);
    // Never back to the source, never below the policy minimum
    assert!(conns[0].packets().is_empty());
    assert!(conns[5].packets().is_empty());

    let delivered = &conns[2].packets()[0];
    let routing = delivered.routing.as_ref().unwrap();
    assert_eq!(routing.strategy, RouteStrategy::CoherenceAmplification);
    assert!(routing.amplified);
    assert!((delivered.coherence_score - 0.55).abs() < 1e-9);
    assert_eq!(delivered.metadata.hop_count, 1);

    assert_eq!(router.metrics().snapshot().healing_amplified, 2);
}

#[tokio::test]
async fn test_no_eligible_peer_returns_to_sender() {
    let router = router(0.3, 0.8);
    let conns = populate(&router, &[("source", 0.9, 0), ("weak", 0.2, 0)]).await;

    let mut stack = stack_with_field(0, 0.7);
    let packet = outgoing(&mut stack, json!("anyone?"), Intention::Healing).await;
    let outcome = router.route_packet(packet, "source").await;

    assert!(outcome.is_returned());
    assert_eq!(outcome.delivered(), 0);
    match &outcome {
        RouteOutcome::ReturnedToSender { reason, notified, .. } => {
            assert!(notified);
            assert!(reason.contains("healing"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let returned = conns[0].packets();
    assert_eq!(returned.len(), 1);
    assert!(returned[0].routing_failed);
    assert!(returned[0].routing_failure.is_some());
    assert!(conns[1].packets().is_empty());
    assert_eq!(router.metrics().snapshot().returned_to_sender, 1);
}

#[tokio::test]
async fn test_low_coherence_boosted_and_persisted() {
    let router = router(0.3, 0.9);
    let conns = populate(&router, &[("source", 0.5, 0), ("peer", 0.5, 0)]).await;

    let mut stack = stack_with_field(0, 0.1);
    let packet = outgoing(&mut stack, json!("faint"), Intention::Connection).await;
    assert!((packet.coherence_score - 0.1).abs() < 1e-9);

    let outcome = router.route_packet(packet, "source").await;
    assert_eq!(selected(&outcome), vec!["peer"]);

    let delivered = &conns[1].packets()[0];
    assert!((delivered.coherence_score - 0.5).abs() < 1e-9);
    let routing = delivered.routing.as_ref().unwrap();
    assert_eq!(routing.boosted_from, Some(0.1));
    assert_eq!(routing.strategy, RouteStrategy::ResonantConnection);
    // The boost changes a covered field
    assert!(!delivered.verify_integrity());
    assert_eq!(router.metrics().snapshot().dissonance_transmuted, 1);
}

#[tokio::test]
async fn test_inquiry_gathers_diverse_fields() {
    let router = router(0.3, 0.8);
    populate(
        &router,
        &[
            ("source", 0.9, 0),
            ("zero", 0.9, 0),
            ("max", 0.8, 255),
            ("mid", 0.8, 128),
            ("low", 0.8, 64),
            ("high", 0.8, 192),
        ],
    )
    .await;

    let mut stack = stack_with_field(0, 0.6);
    let packet = outgoing(&mut stack, json!("why?"), Intention::Inquiry).await;
    let outcome = router.route_packet(packet, "source").await;

    // All three remaining candidates tie at a summed distance of 255; the
    // earliest registered wins
    assert_eq!(selected(&outcome), vec!["zero", "max", "mid"]);
}

#[tokio::test]
async fn test_offering_reaches_every_eligible_peer() {
    let router = router(0.3, 0.8);
    let conns = populate(
        &router,
        &[
            ("source", 0.9, 0),
            ("a", 0.4, 0),
            ("b", 0.6, 0),
            ("c", 0.9, 0),
            ("d", 0.5, 0),
            ("quiet", 0.3, 0),
        ],
    )
    .await;

    let mut stack = stack_with_field(0, 0.6);
    let packet = outgoing(&mut stack, json!("gift"), Intention::Offering).await;
    let outcome = router.route_packet(packet, "source").await;

    assert_eq!(outcome.delivered(), 4);
    assert_eq!(selected(&outcome), vec!["c", "b", "d", "a"]);
    assert!(conns[5].packets().is_empty());
    let note = conns[1].packets()[0].routing.as_ref().unwrap().note.clone();
    assert!(note.is_some());
}

#[tokio::test]
async fn test_connection_picks_most_resonant_field() {
    let router = router(0.3, 0.8);
    let conns = populate(&router, &[("source", 0.9, 10), ("far", 0.9, 250), ("near", 0.5, 12)]).await;

    let mut stack = stack_with_field(10, 0.6);
    let packet = outgoing(&mut stack, json!("hello"), Intention::Connection).await;
    let outcome = router.route_packet(packet, "source").await;

    assert_eq!(selected(&outcome), vec!["near"]);
    assert!(conns[1].packets().is_empty());
    assert_eq!(conns[2].packets().len(), 1);
}

#[tokio::test]
async fn test_closed_connection_skipped_on_dispatch() {
    let router = router(0.3, 0.8);
    let conns = populate(&router, &[("source", 0.9, 0), ("gone", 0.9, 0), ("here", 0.5, 0)]).await;
    conns[1].close();

    let mut stack = stack_with_field(0, 0.6);
    let packet = outgoing(&mut stack, json!("gift"), Intention::Offering).await;
    let outcome = router.route_packet(packet, "source").await;

    assert_eq!(selected(&outcome), vec!["here"]);
    assert_eq!(outcome.delivered(), 1);
}

#[tokio::test]
async fn test_source_record_refreshed() {
    let router = router(0.3, 0.8);
    populate(&router, &[("source", 0.5, 0), ("peer", 0.9, 0)]).await;

    let mut stack = stack_with_field(42, 0.75);
    let packet = outgoing(&mut stack, json!("x"), Intention::Connection).await;
    router.route_packet(packet, "source").await;

    assert_eq!(router.registry().coherence("source"), Some(0.75));
    let source = router
        .registry()
        .snapshot()
        .into_iter()
        .find(|p| p.peer_id == "source")
        .unwrap();
    assert_eq!(source.field_vector, vec![42; 16]);
}

#[tokio::test]
async fn test_heartbeat_evicts_stale_peer_once() {
    let config = RouterConfig {
        router_id: Some("test-router".into()),
        peer_timeout: Duration::from_millis(100),
        ..RouterConfig::default()
    };
    let router = Router::new(config, &StackConfig::default());
    let conns = populate(&router, &[("stale", 0.5, 0), ("fresh", 0.5, 0)]).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    router.handle_message("fresh", Message::Pong { timestamp: 1 }).await;

    let evicted = router.heartbeat();
    assert_eq!(evicted, vec!["stale".to_string()]);
    assert!(conns[0].is_closed());
    assert!(!conns[1].is_closed());

    assert!(router.heartbeat().is_empty());
    let metrics = router.metrics().snapshot();
    assert_eq!(metrics.peers_evicted, 1);
    assert_eq!(metrics.peers_active, 1);
}

#[tokio::test]
async fn test_harmonization_broadcast() {
    let router = router(0.3, 0.9);
    let conns = populate(&router, &[("a", 0.5, 0), ("b", 0.7, 0)]).await;

    let h = router.harmonize_field().await;
    assert!((h.network_coherence - 0.6).abs() < 1e-9);
    assert!((h.router_coherence - 0.75).abs() < 1e-9);
    assert_eq!(h.notified, 2);
    assert!((router.coherence().await - 0.75).abs() < 1e-9);
    for conn in &conns {
        assert!(conn
            .messages()
            .iter()
            .any(|m| matches!(m, luminous_stack::Message::Harmonization { peer_count: 2, .. })));
    }
}

#[tokio::test]
async fn test_status_reports_peers() {
    let router = router(0.3, 0.8);
    populate(&router, &[("a", 0.5, 0)]).await;
    let status = router.status().await;
    assert_eq!(status.router_id, "test-router");
    assert_eq!(status.connected_peers, 1);
    assert_eq!(status.metrics.peers_connected, 1);
}

#[tokio::test]
async fn test_saturated_hop_count_still_routes() {
    let router = router(0.3, 0.8);
    let conns = populate(&router, &[("source", 0.9, 0), ("dest", 0.9, 0)]).await;

    let mut stack = stack_with_field(0, 0.8);
    let mut packet = outgoing(&mut stack, json!("far travelled"), Intention::Offering).await;
    packet.metadata.hop_count = u32::MAX;

    let outcome = router.route_packet(packet, "source").await;
    assert_eq!(outcome.delivered(), 1);
    assert_eq!(conns[1].packets()[0].metadata.hop_count, u32::MAX);
}
