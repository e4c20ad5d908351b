//! Event emitter abstraction for decoupling the runtime from transport.
//!
//! The scheduler and graph editor depend on the [`EventEmitter`] trait rather
//! than concrete broadcast channels, enabling testing and alternative
//! transport implementations.

use super::{GraphEvent, NodeEvent, PipelineEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a graph topology event.
    fn emit_graph(&self, event: GraphEvent);

    /// Emits a node lifecycle event.
    fn emit_node(&self, event: NodeEvent);

    /// Emits a pipeline control event.
    fn emit_pipeline(&self, event: PipelineEvent);
}

/// No-op emitter for embedding or testing.
///
/// Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_graph(&self, _event: GraphEvent) {
        // No-op
    }

    fn emit_node(&self, _event: NodeEvent) {
        // No-op
    }

    fn emit_pipeline(&self, _event: PipelineEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. Useful for debugging event flow without
/// attaching a client.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_graph(&self, event: GraphEvent) {
        tracing::debug!(?event, "graph_event");
    }

    fn emit_node(&self, event: NodeEvent) {
        tracing::debug!(?event, "node_event");
    }

    fn emit_pipeline(&self, event: PipelineEvent) {
        tracing::debug!(?event, "pipeline_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        graph_count: AtomicUsize,
        node_count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                graph_count: AtomicUsize::new(0),
                node_count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_graph(&self, _event: GraphEvent) {
            self.graph_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_node(&self, _event: NodeEvent) {
            self.node_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_pipeline(&self, _event: PipelineEvent) {}
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit_graph(GraphEvent::NodeAdded {
            node_id: "mic".to_string(),
            component: "ticker".to_string(),
            timestamp: 0,
        });
        emitter.emit_graph(GraphEvent::NodeRemoved {
            node_id: "mic".to_string(),
            timestamp: 0,
        });
        emitter.emit_node(NodeEvent::StatusChanged {
            node_id: "mic".to_string(),
            status: "running".to_string(),
            timestamp: 0,
        });

        assert_eq!(emitter.graph_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.node_count.load(Ordering::SeqCst), 1);
    }
}
