//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::component::ComponentRegistry;
use crate::error::{FlowError, FlowResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::inspector::FrameInspector;
use crate::metrics::MetricsEngine;
use crate::scheduler::PipelineRuntime;
use crate::state::RuntimeConfig;
use crate::video::VideoTapRegistry;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// The set of component classes known to this process.
    pub registry: Arc<ComponentRegistry>,
    /// The pipeline runtime: graph, sessions, node tasks.
    pub runtime: Arc<PipelineRuntime>,
    /// Periodic metrics sampler.
    pub metrics: Arc<MetricsEngine>,
    /// Recent-message ring for the `/frames` debug stream.
    pub inspector: Arc<FrameInspector>,
    /// Per-node JPEG taps for `/video/ws/{node_id}`.
    pub video: Arc<VideoTapRegistry>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Event bridge mapping domain events onto the broadcast channel.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts background services (the metrics sampler).
    ///
    /// Must be called from within a Tokio runtime context.
    pub fn start_background_tasks(&self) {
        Arc::clone(&self.metrics).start(self.cancel_token.clone());
        log::debug!("[Bootstrap] Background tasks started");
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Stop the pipeline first so node teardown runs while the process
        // is still healthy.
        self.runtime.stop_all().await;

        // Signal cancellation to background tasks.
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Component registry (builtins)
/// 2. Shared infrastructure (event broadcast channel, cancellation token)
/// 3. Observation surfaces (frame inspector, video taps)
/// 4. Pipeline runtime (depends on registry, bridge, inspector, video)
/// 5. Metrics engine (depends on runtime)
///
/// # Errors
///
/// Returns an error if the configuration fails validation.
pub fn bootstrap_services(config: &RuntimeConfig) -> FlowResult<BootstrappedServices> {
    config
        .validate()
        .map_err(FlowError::InvalidArgs)?;

    let registry = Arc::new(ComponentRegistry::with_builtins());

    // Create broadcast channel for real-time events to SSE clients
    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.event_channel_capacity);

    // Create the event bridge that maps domain events to broadcast transport
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let inspector = Arc::new(FrameInspector::new(config.inspector_capacity));
    let video = Arc::new(VideoTapRegistry::new(config.video_channel_capacity));

    let runtime = Arc::new(PipelineRuntime::new(
        Arc::clone(&registry),
        config.clone(),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        Arc::clone(&inspector),
        Arc::clone(&video),
    ));

    let metrics = Arc::new(MetricsEngine::new(Arc::clone(&runtime), config));

    Ok(BootstrappedServices {
        registry,
        runtime,
        metrics,
        inspector,
        video,
        broadcast_tx,
        event_bridge,
        cancel_token,
    })
}
