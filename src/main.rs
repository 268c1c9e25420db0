//! FireTail intercepting proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                    FIRETAIL PROXY                        │
//!                 │                                                          │
//!  Client ───────▶│  http::server ──▶ routing ──▶ intercept::FilterPipeline  │
//!                 │                                 │        │               │
//!                 │                    validator ◀──┘        ▼               │
//!                 │                   (sidecar)        audit::AuditSink ─────┼──▶ Logging API
//!                 │                                                          │
//!  Client ◀───────│  http::response ◀── upstream response ◀──────────────────┼─── Upstream
//!                 │                                                          │
//!                 │  Cross-cutting: config, observability, resilience,       │
//!                 │                 lifecycle                                │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use firetail_proxy::config::loader::{default_config, load_config};
use firetail_proxy::config::watcher::ConfigWatcher;
use firetail_proxy::lifecycle::{signals, startup};
use firetail_proxy::observability::{logging, metrics};
use firetail_proxy::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "firetail-proxy", version, about = "API schema validating and auditing reverse proxy")]
struct Cli {
    /// TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "firetail-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        validator = %config.validator.url,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let booted = startup::bootstrap(&config, &shutdown)?;

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_on_signal(&signal_shutdown).await;
    });

    let server = HttpServer::new(config, booted.pipeline);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    if let Some(shipper) = booted.shipper {
        if let Err(e) = shipper.await {
            tracing::error!(error = %e, "Audit shipper task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
