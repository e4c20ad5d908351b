//! Flowmesh Core - shared library for the Flowmesh pipeline runtime.
//!
//! This crate provides the core functionality for Flowmesh, a typed,
//! live-reconfigurable dataflow pipeline runtime for real-time media
//! processing (capture, detection, recognition, generation, synthesis,
//! playback). It is designed to be used by the standalone headless server
//! and by hosts embedding the runtime.
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - [`payload`]: The runtime-typed elements that flow through channels
//! - [`channel`]: Typed pub/sub fan-out with per-subscriber buffering and lag
//! - [`component`]: The component trait, registry, and init-schema dialect
//! - [`graph`]: The editable DAG of node specs and edges
//! - [`scheduler`]: The pipeline runtime - sessions, node tasks, live edits
//! - [`metrics`]: Snapshot-based metrics engine
//! - [`events`]: Domain event system for real-time client communication
//! - [`api`]: HTTP/SSE/WebSocket control surface
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines traits to decouple core logic from host specifics:
//!
//! - [`Component`](component::Component): What a node instance implements
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//!
//! Each trait has a default implementation suitable for the standalone
//! server.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod channel;
pub mod component;
pub mod error;
pub mod events;
pub mod graph;
pub mod inspector;
pub mod metrics;
pub mod payload;
pub mod protocol_constants;
pub mod scheduler;
pub mod state;
pub mod utils;
pub mod video;

// Re-export commonly used types at the crate root
pub use channel::{Channel, ChannelSample, SubscriberHandle, SubscriberSample};
pub use component::{
    Category, Component, ComponentDescriptor, ComponentRegistration, ComponentRegistry,
    NodeContext, StepInput,
};
pub use error::{ComponentError, ComponentResult, ErrorCode, FlowError, FlowResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, GraphEvent, LoggingEventEmitter,
    NodeEvent, NoopEventEmitter, PipelineEvent,
};
pub use graph::{EdgeSpec, GraphModel, NodeSpec};
pub use inspector::{FrameInspector, FrameRecord};
pub use metrics::{MetricsEngine, MetricsSnapshot};
pub use payload::Payload;
pub use scheduler::{NodeRuntimeState, NodeStatus, NodeView, PipelineRuntime};
pub use state::RuntimeConfig;
pub use utils::{monotonic_secs, now_millis, now_secs_f64};
pub use video::VideoTapRegistry;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
