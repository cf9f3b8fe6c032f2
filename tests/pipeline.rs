//! End-to-end tests of the eight-layer pipeline between two stacks.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{outgoing, stack_with_field};
use luminous_stack::core::packet::{Finalized, Intention, PresenceIntegration, SessionPhase};
use luminous_stack::core::serialization::SerializationFormat;
use luminous_stack::error::ProtocolError;
use luminous_stack::stack::{SendOptions, StackEvent};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_string_payload_survives_both_formats() {
    for format in [SerializationFormat::Json, SerializationFormat::MessagePack] {
        let mut alice = stack_with_field(100, 0.8).with_format(format);
        let mut bob = stack_with_field(100, 0.5);

        let packet = outgoing(&mut alice, json!("hello field"), Intention::Offering).await;
        let raw = alice.encode(&packet).expect("encode");
        let received = bob.receive(&raw).await.expect("receive");

        assert_eq!(received.payload, json!("hello field"), "format {format:?}");
        assert_eq!(received.intention(), Intention::Offering);
        assert_eq!(received.finalized, Some(Finalized::Received));
        assert_eq!(received.decoded_meaning.unwrap().text, "hello field");
    }
}

#[tokio::test]
async fn test_structured_payload_survives_both_formats() {
    let payload = json!({"kind": "greeting", "depth": 3, "tags": ["a", "b"], "nested": {"ok": true}});
    for format in [SerializationFormat::Json, SerializationFormat::MessagePack] {
        let mut alice = stack_with_field(40, 0.7).with_format(format);
        let mut bob = stack_with_field(40, 0.7);

        let packet = outgoing(&mut alice, payload.clone(), Intention::Inquiry).await;
        let received = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap();

        assert_eq!(received.payload, payload);
        assert_eq!(received.intention(), Intention::Inquiry);
    }
}

#[tokio::test]
async fn test_bare_json_envelope_accepted() {
    let mut alice = stack_with_field(10, 0.6);
    let mut bob = stack_with_field(10, 0.6);
    let packet = outgoing(&mut alice, json!("plain"), Intention::Connection).await;

    let raw = serde_json::to_vec(&packet).unwrap();
    let received = bob.receive(&raw).await.unwrap();
    assert_eq!(received.payload, json!("plain"));
}

#[tokio::test]
async fn test_digest_stable_through_pipeline() {
    let mut alice = stack_with_field(77, 0.9);
    let packet = outgoing(&mut alice, json!({"n": 1}), Intention::Healing).await;
    // Outgoing layers never touch the covered fields
    assert!(packet.verify_integrity());

    let mut bob = stack_with_field(77, 0.9);
    let received = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap();
    assert_eq!(received.integrity_digest, packet.integrity_digest);
    assert!(!received.needs_resonance_repair);
}

#[tokio::test]
async fn test_session_establishment_is_idempotent() {
    let mut alice = stack_with_field(100, 0.8);
    let mut bob = stack_with_field(100, 0.5);

    let established = Arc::new(Mutex::new(0));
    let counter = established.clone();
    bob.on_event(move |event| {
        if matches!(event, StackEvent::SessionEstablished { .. }) {
            *counter.lock().unwrap() += 1;
        }
    })
    .unwrap();

    let packet = outgoing(&mut alice, json!("hi"), Intention::Connection).await;
    assert_eq!(packet.session_phase, SessionPhase::Initiating);
    let session_id = packet.session_id.clone().unwrap();

    let raw = alice.encode(&packet).unwrap();
    let first = bob.receive(&raw).await.unwrap();
    let second = bob.receive(&raw).await.unwrap();

    assert_eq!(first.session_phase, SessionPhase::Established);
    assert_eq!(second.session_phase, SessionPhase::Established);
    assert!(bob.sessions().is_established(&session_id));
    assert_eq!(bob.sessions().len(), 1);
    assert_eq!(*established.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_explicit_session_is_continued() {
    let mut alice = stack_with_field(100, 0.8);
    let session_id = vec![3u8; 32];
    let packet = alice
        .send(json!("again"), SendOptions::default().in_session(session_id.clone()))
        .await;
    assert_eq!(packet.session_id, Some(session_id));
    assert_eq!(packet.session_phase, SessionPhase::Established);
    assert_eq!(packet.presence.unwrap().continuity.unwrap().exchange_count, 1);
}

#[tokio::test]
async fn test_explicit_session_counts_every_exchange() {
    let mut alice = stack_with_field(100, 0.8);
    let session_id = vec![9u8; 32];

    let first = alice
        .send(json!("one"), SendOptions::default().in_session(session_id.clone()))
        .await;
    let second = alice
        .send(json!("two"), SendOptions::default().in_session(session_id.clone()))
        .await;

    for packet in [&first, &second] {
        assert_eq!(packet.session_id.as_deref(), Some(session_id.as_slice()));
        assert_eq!(packet.session_phase, SessionPhase::Established);
    }
    let continuity = second.presence.unwrap().continuity.unwrap();
    assert_eq!(continuity.exchange_count, 2);
    assert_eq!(alice.sessions().len(), 1);
}

#[tokio::test]
async fn test_identical_inputs_get_distinct_digests() {
    let alice = stack_with_field(100, 0.8);
    let options = SendOptions::with_intention(Intention::Offering);
    let a = alice.create_packet(json!("same"), &options);
    let b = alice.create_packet(json!("same"), &options);

    assert_ne!(a.origin_signature, b.origin_signature);
    assert_ne!(a.integrity_digest, b.integrity_digest);
    assert!(a.verify_integrity());
    assert!(b.verify_integrity());
}

#[tokio::test]
async fn test_sender_cannot_preset_receiver_annotations() {
    let mut alice = stack_with_field(60, 0.6);
    let mut bob = stack_with_field(60, 0.6);

    let evolved = Arc::new(Mutex::new(0));
    let counter = evolved.clone();
    bob.on_event(move |event| {
        if matches!(event, StackEvent::FieldEvolved { .. }) {
            *counter.lock().unwrap() += 1;
        }
    })
    .unwrap();

    let mut packet = outgoing(&mut alice, json!("quiet"), Intention::Connection).await;
    packet.presence = None;
    packet.integrated_presence = Some(PresenceIntegration {
        previous_coherence: 0.0,
        new_coherence: 1.0,
    });
    packet.needs_resonance_repair = true;
    packet.field_coherence = Some(0.0);

    let received = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap();

    assert!((bob.coherence_level() - 0.6).abs() < 1e-9);
    assert!(received.integrated_presence.is_none());
    assert!(!received.needs_resonance_repair);
    assert_ne!(received.field_coherence, Some(0.0));
    assert_eq!(*evolved.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_dissonant_fields_rejected() {
    let mut alice = stack_with_field(0, 0.8);
    let mut bob = stack_with_field(255, 0.8);
    let packet = outgoing(&mut alice, json!("far"), Intention::Connection).await;

    let err = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap_err();
    assert!(err.is_packet_rejection());
    assert!(matches!(err, ProtocolError::FieldDissonance { .. }));
    // The stack stays usable
    let mut carol = stack_with_field(255, 0.8);
    let ok = outgoing(&mut carol, json!("near"), Intention::Connection).await;
    assert!(bob.receive(&carol.encode(&ok).unwrap()).await.is_ok());
}

#[tokio::test]
async fn test_missing_origin_rejected() {
    let mut alice = stack_with_field(5, 0.8);
    let mut bob = stack_with_field(5, 0.8);
    let mut packet = outgoing(&mut alice, json!("x"), Intention::Connection).await;
    packet.origin_signature.clear();

    let err = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidOrigin(_)));
}

#[tokio::test]
async fn test_malformed_envelopes_rejected() {
    let mut bob = stack_with_field(5, 0.8);
    assert!(matches!(
        bob.receive(b"").await,
        Err(ProtocolError::DeserializeError(_))
    ));
    assert!(matches!(
        bob.receive(b"{not json").await,
        Err(ProtocolError::DeserializeError(_))
    ));
    assert!(matches!(
        bob.receive(b"\x09garbage").await,
        Err(ProtocolError::DeserializeError(_))
    ));
}

#[tokio::test]
async fn test_presence_moves_receiver_coherence() {
    let mut alice = stack_with_field(60, 0.9);
    let mut bob = stack_with_field(60, 0.5);
    let packet = outgoing(&mut alice, json!("warm"), Intention::Connection).await;
    let received = bob.receive(&alice.encode(&packet).unwrap()).await.unwrap();

    assert!((bob.coherence_level() - 0.7).abs() < 1e-9);
    let integration = received.integrated_presence.unwrap();
    assert!((integration.previous_coherence - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_send_and_receive_events_emitted() {
    let mut alice = stack_with_field(60, 0.9);
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let seen = kinds.clone();
    alice
        .on_event(move |event| seen.lock().unwrap().push(event.kind()))
        .unwrap();

    outgoing(&mut alice, json!("x"), Intention::Completion).await;
    let kinds = kinds.lock().unwrap();
    assert!(kinds.contains(&"packet:sent"));
    assert_eq!(kinds.iter().filter(|k| **k == "layer:processed").count(), 8);
}
