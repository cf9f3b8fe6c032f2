#![allow(clippy::unwrap_used)]

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use luminous_stack::config::StackConfig;
use luminous_stack::core::packet::Intention;
use luminous_stack::core::serialization::SerializationFormat;
use luminous_stack::stack::{SendOptions, Stack};
use serde_json::json;

fn bench_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let mut group = c.benchmark_group("pipeline");
    let text_sizes = [16usize, 1024, 64 * 1024];

    for format in [SerializationFormat::Json, SerializationFormat::MessagePack] {
        for &size in &text_sizes {
            let payload = json!("x".repeat(size));
            let config = StackConfig::default();
            let mut alice = Stack::with_field_vector(&config, vec![90; 16]).with_format(format);
            let mut bob = Stack::with_field_vector(&config, vec![90; 16]);

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_function(format!("send_{}_{size}b", format.name()), |b| {
                b.iter(|| {
                    rt.block_on(alice.send(payload.clone(), SendOptions::with_intention(Intention::Offering)))
                })
            });

            let packet = rt.block_on(alice.send(payload.clone(), SendOptions::default()));
            let raw = alice.encode(&packet).unwrap();
            group.bench_function(format!("receive_{}_{size}b", format.name()), |b| {
                b.iter(|| {
                    let received = rt.block_on(bob.receive(&raw)).unwrap();
                    assert!(received.finalized.is_some());
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
