//! HTTP/SSE/WebSocket control surface.
//!
//! This module contains thin handlers that delegate to the runtime. The
//! service is a stateless adapter: it owns no state besides handles to the
//! bootstrapped services.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::bootstrap::BootstrappedServices;
use crate::component::ComponentRegistry;
use crate::events::BroadcastEventBridge;
use crate::inspector::FrameInspector;
use crate::metrics::MetricsEngine;
use crate::protocol_constants::{PORT_SCAN_END, PORT_SCAN_START};
use crate::scheduler::PipelineRuntime;
use crate::state::RuntimeConfig;
use crate::video::VideoTapRegistry;

pub mod http;
mod sse;
mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Component registry for `/component`.
    pub registry: Arc<ComponentRegistry>,
    /// The pipeline runtime driving graph edits and sessions.
    pub runtime: Arc<PipelineRuntime>,
    /// Metrics engine backing the `/metrics` SSE stream.
    pub metrics: Arc<MetricsEngine>,
    /// Frame inspector backing the `/frames` SSE stream.
    pub inspector: Arc<FrameInspector>,
    /// Video taps backing `/video/ws/{node_id}`.
    pub video: Arc<VideoTapRegistry>,
    /// Event bridge backing the `/events` SSE stream.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Application configuration.
    pub config: Arc<RwLock<RuntimeConfig>>,
}

impl AppState {
    /// Builds the state from bootstrapped services.
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<RuntimeConfig>>) -> Self {
        Self {
            registry: Arc::clone(&services.registry),
            runtime: Arc::clone(&services.runtime),
            metrics: Arc::clone(&services.metrics),
            inspector: Arc::clone(&services.inspector),
            video: Arc::clone(&services.video),
            event_bridge: Arc::clone(&services.event_bridge),
            config,
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(PORT_SCAN_START, PORT_SCAN_END).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);

    axum::serve(listener, app).await?;
    Ok(())
}
