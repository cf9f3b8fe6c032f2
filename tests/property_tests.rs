//! Property-based tests using proptest
//!
//! These tests check pipeline and wire invariants across a wide range of
//! randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use luminous_stack::core::codec::{Frame, FrameCodec};
use luminous_stack::config::StackConfig;
use luminous_stack::core::packet::{clamp_unit, vector_similarity, Intention, Packet};
use luminous_stack::core::serialization::SerializationFormat;
use luminous_stack::router::policy::select_diverse;
use luminous_stack::stack::layers::default_layers;
use luminous_stack::stack::session_table::SessionTable;
use luminous_stack::stack::{Layer, SendOptions, Stack, StackContext};
use luminous_stack::utils::compression::{compress, decompress, CompressionKind};
use proptest::prelude::*;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

fn intention() -> impl Strategy<Value = Intention> {
    prop::sample::select(Intention::DECLARABLE.to_vec())
}

/// JSON payloads without floats (float text round trips are not exact)
fn payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "\\PC{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn stack(field: u8, coherence: f64) -> Stack {
    let config = StackConfig {
        coherence_level: coherence,
        ..StackConfig::default()
    };
    Stack::with_field_vector(&config, vec![field; 16])
}

fn in_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

// Property: coherence always lands in [0, 1]
proptest! {
    #[test]
    fn prop_coherence_clamped(value in any::<f64>()) {
        let clamped = clamp_unit(value);
        prop_assert!((0.0..=1.0).contains(&clamped));
        if (0.0..=1.0).contains(&value) {
            prop_assert_eq!(clamped, value);
        }
    }
}

// Property: intention decoding undoes the field modulation for any field
proptest! {
    #[test]
    fn prop_intention_survives_modulation(
        declared in intention(),
        field in prop::collection::vec(any::<u8>(), 16),
    ) {
        let vector = declared.encode(&field);
        prop_assert_eq!(vector.len(), 64);
        prop_assert_eq!(Intention::decode(&vector, &field), declared);
    }
}

// Property: decoding arbitrary bytes yields some intention, never a panic
proptest! {
    #[test]
    fn prop_intention_decode_total(
        vector in prop::collection::vec(any::<u8>(), 0..80),
        field in prop::collection::vec(any::<u8>(), 0..20),
    ) {
        let _ = Intention::decode(&vector, &field);
    }
}

// Property: similarity is symmetric and bounded
proptest! {
    #[test]
    fn prop_similarity_bounded(
        a in prop::collection::vec(any::<u8>(), 16),
        b in prop::collection::vec(any::<u8>(), 16),
    ) {
        let ab = vector_similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - vector_similarity(&b, &a)).abs() < 1e-12);
        prop_assert!((vector_similarity(&a, &a) - 1.0).abs() < 1e-12);
    }
}

// Property: LZ4 compression roundtrip preserves data
proptest! {
    #[test]
    fn prop_lz4_compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..50000)) {
        let compressed = compress(&data, CompressionKind::Lz4).expect("Compression should not fail");
        let decompressed = decompress(&compressed, CompressionKind::Lz4).expect("Decompression should not fail");

        prop_assert_eq!(decompressed, data);
    }
}

// Property: Zstd compression roundtrip preserves data
proptest! {
    #[test]
    fn prop_zstd_compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..50000)) {
        let compressed = compress(&data, CompressionKind::Zstd).expect("Compression should not fail");
        let decompressed = decompress(&compressed, CompressionKind::Zstd).expect("Decompression should not fail");

        prop_assert_eq!(decompressed, data);
    }
}

// Property: the frame decoder never panics on arbitrary input
proptest! {
    #[test]
    fn prop_codec_handles_garbage(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&data[..]);
        for _ in 0..16 {
            match codec.decode(&mut buf) {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }
}

// Property: a valid frame is found behind any garbage prefix
proptest! {
    #[test]
    fn prop_codec_resyncs_after_garbage(
        garbage in prop::collection::vec(any::<u8>().prop_filter("no magic start", |b| *b != b'L'), 0..256),
        body in prop::collection::vec(any::<u8>(), 1..1024),
    ) {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&garbage[..]);
        codec.encode(Frame::new(0, body.clone()), &mut buf).unwrap();

        let frame = codec.decode(&mut buf).unwrap().expect("frame after garbage");
        prop_assert_eq!(frame.body.as_ref(), body.as_slice());
    }
}

// Property: the diversity pick is deterministic and never repeats a peer
proptest! {
    #[test]
    fn prop_diverse_selection_deterministic(fields in prop::collection::vec(any::<u8>(), 1..12)) {
        use luminous_stack::router::{PeerConnection, PeerSnapshot};
        use std::sync::Arc;

        #[derive(Debug)]
        struct Sink;
        impl PeerConnection for Sink {
            fn is_open(&self) -> bool { true }
            fn send(&self, _: luminous_stack::Message) -> luminous_stack::Result<()> { Ok(()) }
            fn close(&self) {}
        }

        let peers: Vec<PeerSnapshot> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| PeerSnapshot {
                peer_id: format!("p{i}"),
                coherence: 0.8,
                field_vector: vec![*f; 16],
                sequence: i as u64,
                connection: Arc::new(Sink),
            })
            .collect();

        let first: Vec<String> = select_diverse(&peers, 3).into_iter().map(|p| p.peer_id).collect();
        let second: Vec<String> = select_diverse(&peers, 3).into_iter().map(|p| p.peer_id).collect();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), peers.len().min(3));
        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), first.len());
    }
}

// Property: any payload comes out of the receiving stack unchanged
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn prop_payload_survives_pipeline(
        payload in payload(),
        intention in intention(),
        msgpack in any::<bool>(),
    ) {
        let format = if msgpack { SerializationFormat::MessagePack } else { SerializationFormat::Json };
        runtime().block_on(async {
            let mut alice = stack(90, 0.8).with_format(format);
            let mut bob = stack(90, 0.6);
            let sent = alice.send(payload.clone(), SendOptions::with_intention(intention)).await;
            let received = bob.receive(&alice.encode(&sent).unwrap()).await.unwrap();
            prop_assert_eq!(&received.payload, &payload);
            prop_assert_eq!(received.intention(), intention);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// Property: coherence stays in [0, 1] after every layer, both directions
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn prop_coherence_bounded_after_each_layer(
        sender in -2.0f64..3.0,
        receiver in -2.0f64..3.0,
        wire in prop_oneof![any::<f64>(), -5.0f64..5.0],
        intention in intention(),
    ) {
        runtime().block_on(async {
            let config = StackConfig::default();
            let alice = stack(120, sender);
            let mut packet: Packet = alice.create_packet(Value::from("x"), &SendOptions::with_intention(intention));
            prop_assert!(in_unit(packet.coherence_score));

            let mut out_ctx = StackContext::new(
                "alice".to_string(),
                vec![120; 16],
                sender,
                config.field_compatibility_threshold,
                SessionTable::new(config.max_sessions, config.session_ttl),
            );
            for layer in default_layers(&config).iter_mut().rev() {
                packet = layer.process_outgoing(packet, &mut out_ctx).await;
                prop_assert!(in_unit(packet.coherence_score), "after outgoing {}", layer.name());
                prop_assert!(in_unit(out_ctx.coherence_level()), "after outgoing {}", layer.name());
            }

            // The receiving stack clamps wire input before its first layer
            packet.set_coherence(wire);
            packet.clear_receiver_annotations();
            let mut in_ctx = StackContext::new(
                "bob".to_string(),
                vec![120; 16],
                receiver,
                config.field_compatibility_threshold,
                SessionTable::new(config.max_sessions, config.session_ttl),
            );
            for layer in default_layers(&config).iter_mut() {
                packet = layer.process_incoming(packet, &mut in_ctx).await.unwrap();
                prop_assert!(in_unit(packet.coherence_score), "after incoming {}", layer.name());
                prop_assert!(in_unit(in_ctx.coherence_level()), "after incoming {}", layer.name());
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
