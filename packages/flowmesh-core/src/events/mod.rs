//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the runtime to emit events
//! - Event types for graph edits, node lifecycle, and pipeline control
//!
//! The actual transport (the `/events` SSE stream) is handled separately in
//! the `api` module using [`BroadcastEventBridge`].

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Graph topology edits (nodes and edges).
    Graph(GraphEvent),

    /// Per-node lifecycle changes.
    Node(NodeEvent),

    /// Whole-pipeline control transitions.
    Pipeline(PipelineEvent),
}

/// Events describing graph topology edits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A node was added to the graph.
    NodeAdded {
        /// The new node's id.
        #[serde(rename = "nodeId")]
        node_id: String,
        /// Component name the node instantiates.
        component: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A node (and its incident edges) was removed.
    NodeRemoved {
        /// The removed node's id.
        #[serde(rename = "nodeId")]
        node_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An edge was added.
    EdgeAdded {
        /// Edge identifier, `src:slot->dst:slot`.
        #[serde(rename = "edgeId")]
        edge_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An edge was removed.
    EdgeRemoved {
        /// Edge identifier, `src:slot->dst:slot`.
        #[serde(rename = "edgeId")]
        edge_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events describing per-node lifecycle changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    /// A node moved to a new lifecycle status.
    StatusChanged {
        /// The node's id.
        #[serde(rename = "nodeId")]
        node_id: String,
        /// New status (`startup`, `running`, `stopped`, `error`).
        status: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A node's work function failed.
    Failed {
        /// The node's id.
        #[serde(rename = "nodeId")]
        node_id: String,
        /// The captured error message.
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events describing whole-pipeline control transitions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// `start_all` completed.
    Started {
        /// Number of node tasks spawned.
        #[serde(rename = "nodeCount")]
        node_count: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// `stop_all` completed.
    Stopped {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

// From implementations for converting inner events to BroadcastEvent
impl From<GraphEvent> for BroadcastEvent {
    fn from(event: GraphEvent) -> Self {
        BroadcastEvent::Graph(event)
    }
}

impl From<NodeEvent> for BroadcastEvent {
    fn from(event: NodeEvent) -> Self {
        BroadcastEvent::Node(event)
    }
}

impl From<PipelineEvent> for BroadcastEvent {
    fn from(event: PipelineEvent) -> Self {
        BroadcastEvent::Pipeline(event)
    }
}
