//! Covenant router: accepts luminous nodes over TCP and routes their packets
//! by intention.

use clap::Parser;
use luminous_stack::config::{LuminousConfig, DEFAULT_COHERENCE_THRESHOLD, DEFAULT_ROUTER_PORT};
use luminous_stack::router::Router;
use luminous_stack::utils::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "covenant-router", about = "Intention-based router for the luminous network")]
struct Cli {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_ROUTER_PORT)]
    port: u16,

    /// Packets below this coherence are boosted before routing
    #[arg(default_value_t = DEFAULT_COHERENCE_THRESHOLD)]
    threshold: f64,

    /// TOML configuration file; positional arguments override its router section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> luminous_stack::Result<()> {
    let cli = Cli::parse();

    if cli.example_config {
        println!("{}", LuminousConfig::example_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => LuminousConfig::from_file(path)?,
        None => LuminousConfig::default(),
    };
    config.router.address = format!("0.0.0.0:{}", cli.port);
    config.router.coherence_threshold = cli.threshold;
    config.validate_strict()?;

    let _guard = init_logging(&config.logging)?;

    let router = Arc::new(Router::new(config.router.clone(), &config.stack));
    info!(
        router = router.id(),
        port = cli.port,
        threshold = cli.threshold,
        "Starting covenant router"
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    let status_router = router.clone();
    if let Err(e) = router.run(config.transport.clone(), shutdown_rx).await {
        error!(error = %e, "Router stopped with error");
        return Err(e);
    }

    let status = status_router.status().await;
    info!(
        routed = status.metrics.packets_routed,
        delivered = status.metrics.packets_delivered,
        returned = status.metrics.returned_to_sender,
        "Final router metrics"
    );
    Ok(())
}
