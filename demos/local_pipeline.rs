//! Example: two stacks talking without a router
//!
//! Sends one packet per intention from one stack to another through both wire
//! formats and prints the analyzer's view of each received packet.
//!
//! Run with: `cargo run --example local_pipeline`

#![allow(clippy::uninlined_format_args)]

use luminous_stack::analyzer::PacketAnalyzer;
use luminous_stack::config::StackConfig;
use luminous_stack::core::packet::Intention;
use luminous_stack::core::serialization::SerializationFormat;
use luminous_stack::stack::{SendOptions, Stack};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Local Pipeline Demo ===\n");

    let config = StackConfig {
        coherence_level: 0.8,
        ..StackConfig::default()
    };
    let mut receiver = Stack::new(&config);
    let mut analyzer = PacketAnalyzer::new(receiver.field_vector().to_vec());

    for format in [SerializationFormat::Json, SerializationFormat::MessagePack] {
        let mut sender = Stack::with_field_vector(&config, receiver.field_vector().to_vec()).with_format(format);
        for intention in Intention::DECLARABLE {
            let packet = sender
                .send(
                    json!({"greeting": "hello", "intention": intention.as_str()}),
                    SendOptions::with_intention(intention),
                )
                .await;
            let raw = sender.encode(&packet)?;
            println!("{} {:<10} {} bytes", format.name(), intention, raw.len());

            let received = receiver.receive(&raw).await?;
            analyzer.capture(&received);
        }
    }

    if let Some(latest) = analyzer.captures().next() {
        println!("\nLatest capture:\n{}", latest.analysis);
    }
    if let Some(summary) = analyzer.summary() {
        println!("{}", summary);
    }
    println!("Receiver coherence is now {:.3}", receiver.coherence_level());
    Ok(())
}
