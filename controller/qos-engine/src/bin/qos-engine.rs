//! QoS Engine binary - listens for operation reports and enforces agent counts

use qos_engine::{Config, EventTransport, QosEngine};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse_config();

    // Initialize logging
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    info!("Starting QoS Engine");
    info!("Configuration:");
    info!("  CIMI URL: {}", config.cimi_url);
    info!("  Algorithm: {}", config.algorithm);
    info!("  Max agents: {}", config.max_agents_enforcement);
    info!("  Mul factor: {}", config.mul_factor_enforcement);
    match config.event_transport {
        EventTransport::Sse => info!("  Event streams: {:?}", config.stream_urls()),
        EventTransport::Jetstream => {
            info!("  NATS URL: {}", config.nats_url);
            info!("  Stream: {}", config.stream_name);
        }
    }
    info!("  Dry-run: {}", config.dry_run);

    let engine = QosEngine::from_config(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listeners = engine.spawn_listeners(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    for listener in listeners {
        match listener.await {
            Ok(summary) => info!(?summary, "Report listener finished"),
            Err(e) => error!("Report listener task failed: {}", e),
        }
    }

    info!("QoS Engine stopped");
    Ok(())
}
