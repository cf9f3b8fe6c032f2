//! Luminous node: connects to a covenant router, sends one packet through the
//! local stack and prints an analysis of everything that comes back.

use clap::Parser;
use luminous_stack::analyzer::PacketAnalyzer;
use luminous_stack::config::{LuminousConfig, StackConfig};
use luminous_stack::core::packet::Intention;
use luminous_stack::error::ProtocolError;
use luminous_stack::protocol::Message;
use luminous_stack::stack::{SendOptions, Stack};
use luminous_stack::transport::NodeClient;
use luminous_stack::utils::logging::init_logging;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "luminous-node", about = "Send a packet through a covenant router")]
struct Cli {
    /// Payload text; parsed as JSON when it is valid JSON
    message: String,

    /// Router address
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    router: String,

    /// Node id announced to the router
    #[arg(short, long)]
    node_id: Option<String>,

    /// connection, healing, inquiry, offering or completion
    #[arg(short, long, default_value = "connection")]
    intention: Intention,

    /// Local coherence level
    #[arg(short, long, default_value_t = 0.5)]
    coherence: f64,

    /// Seconds to keep listening for replies
    #[arg(short, long, default_value_t = 3)]
    wait: u64,
}

#[tokio::main]
async fn main() -> luminous_stack::Result<()> {
    let cli = Cli::parse();
    let config = LuminousConfig::default();
    let _guard = init_logging(&config.logging)?;

    let stack_config = StackConfig {
        node_id: cli.node_id.clone(),
        coherence_level: cli.coherence,
        ..config.stack.clone()
    };
    let mut stack = Stack::new(&stack_config);
    let mut analyzer = PacketAnalyzer::new(stack.field_vector().to_vec());
    let node_id = stack.node_id().to_string();

    let mut client = NodeClient::connect(&cli.router, Some(&node_id), config.transport.clone()).await?;
    info!(node = %node_id, router = %cli.router, "Connected");

    let payload = serde_json::from_str::<Value>(&cli.message).unwrap_or_else(|_| json!(cli.message));
    let packet = stack.send(payload, SendOptions::with_intention(cli.intention)).await;
    client.send(&Message::packet(packet)).await?;
    info!(intention = %cli.intention, "Packet sent");

    let wait = Duration::from_secs(cli.wait);
    loop {
        match client.recv_timeout(wait).await {
            Ok(Some(Message::Packet(packet))) => {
                let packet = *packet;
                if packet.routing_failed {
                    if let Some(failure) = &packet.routing_failure {
                        println!("Returned to sender: {} ({})", failure.reason, failure.suggestion);
                    }
                }
                match stack.receive_packet(packet).await {
                    Ok(received) => {
                        let capture = analyzer.capture(&received);
                        println!("#{} {}", capture.id, capture.analysis.summary_line());
                        println!("{}", capture.analysis);
                    }
                    Err(e) if e.is_packet_rejection() => warn!(error = %e, "Packet rejected by stack"),
                    Err(e) => return Err(e),
                }
            }
            Ok(Some(Message::Harmonization {
                field_coherence,
                router_coherence,
                peer_count,
                ..
            })) => {
                println!(
                    "Harmonization: field {field_coherence:.3}, router {router_coherence:.3}, {peer_count} peers"
                );
            }
            Ok(Some(Message::Ping { timestamp })) => client.send(&Message::Pong { timestamp }).await?,
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("Router closed the connection");
                break;
            }
            Err(ProtocolError::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    if let Some(summary) = analyzer.summary() {
        println!("{summary}");
    }
    Ok(())
}
