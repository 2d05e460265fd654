//! Failover reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                FAILOVER PROXY                │
//!   Client Request       │  ┌──────────┐   ┌───────────┐   ┌─────────┐ │      ┌─────────┐
//!   ─────────────────────┼─▶│   http   │──▶│ transform │──▶│dispatch │─┼─────▶│ primary │
//!                        │  │  server  │   └───────────┘   │ (≤ 2    │ │      └─────────┘
//!                        │  └────┬─────┘                   │attempts)│─┼──┐   ┌─────────┐
//!   Client Response      │       │                         └────┬────┘ │  └──▶│ backup  │
//!   ◀────────────────────┼───────┘ streamed relay / 502          │      │      └─────────┘
//!                        │                                 ┌─────▼────┐ │
//!                        │  /health /brain-status ◀────────│ failover │ │
//!                        │                                 │ machine  │─┼──▶ state file
//!                        │                                 └──────────┘ │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use failover_proxy::config::{load_config, ProxyConfig};
use failover_proxy::lifecycle::{shutdown_signal, Shutdown};
use failover_proxy::observability::{logging, metrics};
use failover_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "failover-proxy")]
#[command(about = "Reverse proxy that fails over from an OAuth upstream to an API-key backup", long_about = None)]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability.log_level);

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("failover-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let server = HttpServer::new(&config)?;

    let backup = if config.backup.enabled() {
        format!("{} via {}", config.backup.model, config.backup.host)
    } else {
        "disabled".to_string()
    };
    tracing::info!(
        primary = %config.primary.host,
        backup = %backup,
        cooldown_ms = config.failover.cooldown_ms,
        state_file = %config.failover.state_file,
        active = %server.failover().active(),
        relay = server.relay_enabled(),
        attempt_timeout_secs = ?config.timeouts.attempt_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let stopped = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, stopped).await?;
    Ok(())
}
