//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   EDGE GATEWAY                    │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ─────────────────────┼─▶│  http   │──▶│ routing  │──▶│load_balancer │   │
//!                        │  │ server  │   │ snapshot │   │  + accounting│   │
//!                        │  └─────────┘   └────▲─────┘   └──────┬───────┘   │
//!                        │                     │                ▼           │
//!   Client Response      │  ┌─────────┐        │         ┌──────────────┐    │
//!   ◀────────────────────┼──│ gateway │◀───────┼─────────│   forward    │◀───┼──── Backend
//!                        │  └─────────┘        │         └──────────────┘    │
//!                        │              ┌──────┴───────┐                     │
//!   Coordinator ◀────────┼─────────────▶│   control    │   config reload     │
//!     (WebSocket)        │              │   channel    │   admin API         │
//!                        │              └──────────────┘                     │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, ConfigWatcher, ProxyConfig};
use edge_gateway::lifecycle::{shutdown_signal, Shutdown};
use edge_gateway::{observability, HttpServer};

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Domain-routing edge gateway")]
struct Args {
    /// TOML configuration file; watched for route changes
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    observability::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        control_enabled = config.control.enabled,
        accounting = ?config.accounting.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Kept alive for the life of the process; dropping it stops the watch.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = tokio::sync::mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        joined = &mut server_task => {
            // Server stopped on its own, e.g. the admin listener failed to bind.
            joined??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    let listeners = shutdown.trigger();
    tracing::info!(tasks = listeners, "Shutting down");

    tokio::select! {
        joined = server_task => joined??,
        _ = shutdown_signal() => tracing::warn!("Second signal received, exiting without draining"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
