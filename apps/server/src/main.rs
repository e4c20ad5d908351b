//! Flowmesh Server - Standalone headless server for the pipeline runtime.
//!
//! Hosts the component registry, the graph, and the control surface the
//! browser-based graph editor talks to. Designed for deployments where the
//! runtime runs as a background daemon.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flowmesh_core::{bootstrap_services, start_server, AppState};
use parking_lot::RwLock;
use tokio::signal;

use crate::config::ServerConfig;

/// Flowmesh Server - Headless dataflow pipeline runtime.
#[derive(Parser, Debug)]
#[command(name = "flowmesh-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "FLOWMESH_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "FLOWMESH_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Flowmesh Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    log::info!(
        "Configuration: bind_port={}, metrics_interval_ms={}, channel_capacity={}",
        config.bind_port,
        config.metrics_interval_ms,
        config.channel_capacity
    );

    // Bootstrap services
    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Start background tasks (metrics sampler)
    services.start_background_tasks();

    // Build app state for the HTTP server
    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    // Spawn HTTP server on the main tokio runtime.
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: stop the pipeline, cancel background tasks.
    services.shutdown().await;

    // Abort the server task (clients observe the connection closing)
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
