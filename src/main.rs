//! Service gateway (v1)
//!
//! An authenticating API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ auth (token → handle → cache) ──▶ gateway forward
//!                                                                              │
//!                                                                              ▼
//!                     discovery ──▶ endpointer ──▶ load balancer ──▶ dispatcher (retry/deadline)
//!                     (static or                                               │
//!                      registry)                                               ▼
//!     Client Response                                              endpoint (breaker + transport)
//!     ◀────────────── envelope ◀──────────────────────────────────────────── upstream service
//! ```
//!
//! # Startup Order
//!
//! Config → logging → metrics → cache/auth/dispatchers → listener →
//! registration → config watcher → signal handler → serve.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::{load_config, ConfigWatcher};
use service_gateway::lifecycle::signals::spawn_signal_handler;
use service_gateway::lifecycle::{build_gateway, Shutdown};
use service_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "service-gateway")]
#[command(about = "Authenticating API gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        cache = ?config.cache.backend,
        discovery = config.discovery.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

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

    let gateway = Arc::new(build_gateway(config.clone()).await?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let registered = match gateway.register().await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Service registration failed");
            None
        }
    };

    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watch_handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };
    let reloader = gateway.clone();
    tokio::spawn(async move {
        while let Some(new_config) = updates.recv().await {
            reloader.apply_instances(&new_config);
        }
    });

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = gateway.server();
    server.run(listener, shutdown.subscribe()).await?;

    if let (Some(id), Some(registry)) = (registered, gateway.registry.as_ref()) {
        match registry.deregister(&id).await {
            Ok(()) => tracing::info!(id = %id, "Deregistered from service registry"),
            Err(e) => tracing::warn!(id = %id, error = %e, "Deregistration failed"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
