//! Pipeline runtime: graph edits, session lifecycle, and node scheduling.
//!
//! [`PipelineRuntime`] is the orchestrator the control surface talks to. It
//! owns the editable graph, the per-node runtime status records, and — while
//! a session is active — the network of channels, node tasks, and per-edge
//! forwarders. The graph stays pure data; tasks and channels live only in
//! the session and are torn down wholesale on `stop_all`.
//!
//! Live edits: edge adds/removals apply to an active session atomically
//! under the session lock (subscribe + spawn forwarder, or unsubscribe).
//! Removing a node performs a per-node stop first. Nodes added while running
//! join at the next `start_all`.

mod node_task;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelSample};
use crate::component::{ComponentRegistry, NodeContext, StepInput};
use crate::error::{FlowError, FlowResult};
use crate::events::{EventEmitter, GraphEvent, PipelineEvent};
use crate::graph::{EdgeSpec, GraphModel};
use crate::inspector::FrameInspector;
use crate::state::RuntimeConfig;
use crate::utils::now_millis;
use crate::video::VideoTapRegistry;

use node_task::{record_failure, spawn_forwarder, NodeTask};

/// Per-node lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Task created, `start()` not yet complete.
    Startup,
    /// Actively stepping.
    Running,
    /// Not part of an active session.
    Stopped,
    /// The node's work function failed; see the error record.
    Error,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Startup => "startup",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Runtime record for one node.
#[derive(Debug, Clone)]
pub struct NodeRuntimeState {
    pub status: NodeStatus,
    /// Monotonic seconds; set exactly while `running`.
    pub started_at: Option<f64>,
    /// Last failure message, kept until the next `start_all`.
    pub error: Option<String>,
}

impl Default for NodeRuntimeState {
    fn default() -> Self {
        Self {
            status: NodeStatus::Stopped,
            started_at: None,
            error: None,
        }
    }
}

/// Node listing entry for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    #[serde(rename = "type")]
    pub component: String,
    pub status: NodeStatus,
}

/// One node's slice of a metrics sample.
#[derive(Debug, Clone)]
pub struct NodeSample {
    pub id: String,
    pub component: String,
    pub status: NodeStatus,
    pub started_at: Option<f64>,
    pub error: Option<String>,
    pub channels: Vec<ChannelSample>,
}

/// Handle to one spawned node task.
struct NodeHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    /// Kept so live edge adds can wire new forwarders into the funnel.
    input_tx: Option<mpsc::Sender<StepInput>>,
}

/// One running forwarder and the edge it serves.
struct ForwarderEntry {
    join: JoinHandle<()>,
    edge: EdgeSpec,
}

/// Everything owned for the duration of one running pipeline.
struct Session {
    cancel: CancellationToken,
    channels: HashMap<String, Arc<Channel>>,
    nodes: HashMap<String, NodeHandle>,
    forwarders: HashMap<String, ForwarderEntry>,
}

/// A node extracted from a session for per-node shutdown.
struct DetachedNode {
    node_id: String,
    handle: NodeHandle,
    forwarders: Vec<ForwarderEntry>,
    channels: Vec<Arc<Channel>>,
}

impl DetachedNode {
    /// Cancels the task, waits it out, closes the node's channels, and
    /// drains the forwarders on its edges.
    async fn shutdown(self) {
        self.handle.cancel.cancel();
        if let Err(e) = self.handle.join.await {
            log::warn!("[Runtime] Node {} task join error: {}", self.node_id, e);
        }
        for channel in &self.channels {
            channel.close();
        }
        for entry in self.forwarders {
            if let Err(e) = entry.join.await {
                log::warn!(
                    "[Runtime] Forwarder {} join error: {}",
                    entry.edge.id(),
                    e
                );
            }
        }
    }
}

impl Session {
    /// Subscribes and spawns the forwarder for a newly added edge.
    ///
    /// A no-op when either endpoint has no running task (the edge then takes
    /// effect at the next start).
    fn attach_edge(&mut self, edge: &EdgeSpec) {
        let Some(channel) = self.channels.get(&edge.channel_name()) else {
            return;
        };
        let Some(tx) = self
            .nodes
            .get(&edge.target_node)
            .and_then(|n| n.input_tx.clone())
        else {
            return;
        };
        match channel.subscribe(edge.target_node.clone()) {
            Ok(handle) => {
                let join = spawn_forwarder(handle, edge.target_slot.clone(), tx);
                self.forwarders
                    .insert(edge.id(), ForwarderEntry { join, edge: edge.clone() });
            }
            Err(e) => {
                log::warn!("[Runtime] Could not subscribe {}: {}", edge.id(), e);
            }
        }
    }

    /// Unsubscribes a removed edge. The forwarder observes the closed handle
    /// and exits on its own.
    fn detach_edge(&mut self, edge: &EdgeSpec) {
        self.forwarders.remove(&edge.id());
        if let Some(channel) = self.channels.get(&edge.channel_name()) {
            channel.unsubscribe(&edge.target_node);
        }
    }

    /// Extracts one node and everything attached to it for shutdown.
    fn detach_node(&mut self, node_id: &str) -> Option<DetachedNode> {
        let handle = self.nodes.remove(node_id)?;

        let edge_ids: Vec<String> = self
            .forwarders
            .iter()
            .filter(|(_, entry)| {
                entry.edge.source_node == node_id || entry.edge.target_node == node_id
            })
            .map(|(id, _)| id.clone())
            .collect();
        let mut forwarders = Vec::with_capacity(edge_ids.len());
        for id in edge_ids {
            if let Some(entry) = self.forwarders.remove(&id) {
                // Incoming edges: detach our subscription so the forwarder's
                // recv ends even though the upstream channel stays open.
                if entry.edge.target_node == node_id {
                    if let Some(channel) = self.channels.get(&entry.edge.channel_name()) {
                        channel.unsubscribe(node_id);
                    }
                }
                forwarders.push(entry);
            }
        }

        let channel_names: Vec<String> = self
            .channels
            .values()
            .filter(|c| c.owner_node() == node_id)
            .map(|c| c.name().to_string())
            .collect();
        let channels = channel_names
            .iter()
            .filter_map(|name| self.channels.remove(name))
            .collect();

        Some(DetachedNode {
            node_id: node_id.to_string(),
            handle,
            forwarders,
            channels,
        })
    }
}

/// The pipeline runtime and scheduler.
pub struct PipelineRuntime {
    registry: Arc<ComponentRegistry>,
    config: RuntimeConfig,
    graph: RwLock<GraphModel>,
    statuses: Arc<DashMap<String, NodeRuntimeState>>,
    /// Lock order: session before graph, always.
    session: Mutex<Option<Session>>,
    emitter: Arc<dyn EventEmitter>,
    inspector: Arc<FrameInspector>,
    video: Arc<VideoTapRegistry>,
}

impl PipelineRuntime {
    /// Creates a runtime over the given registry with an empty graph.
    pub fn new(
        registry: Arc<ComponentRegistry>,
        config: RuntimeConfig,
        emitter: Arc<dyn EventEmitter>,
        inspector: Arc<FrameInspector>,
        video: Arc<VideoTapRegistry>,
    ) -> Self {
        Self {
            graph: RwLock::new(GraphModel::new(Arc::clone(&registry))),
            registry,
            config,
            statuses: Arc::new(DashMap::new()),
            session: Mutex::new(None),
            emitter,
            inspector,
            video,
        }
    }

    /// The component registry backing this runtime.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Whether a session is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Whether a node with this id exists in the graph.
    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.graph.read().contains_node(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Graph edits
    // ─────────────────────────────────────────────────────────────────────

    /// Adds a node to the graph. Added nodes are `stopped` until the next
    /// `start_all`.
    pub fn add_node(
        &self,
        component: &str,
        init: &Value,
        id: Option<String>,
    ) -> FlowResult<NodeView> {
        let spec = self.graph.write().add_node(component, init, id)?;
        self.statuses
            .insert(spec.id.clone(), NodeRuntimeState::default());
        log::info!("[Graph] Node {} added ({})", spec.id, spec.component);
        self.emitter.emit_graph(GraphEvent::NodeAdded {
            node_id: spec.id.clone(),
            component: spec.component.clone(),
            timestamp: now_millis(),
        });
        Ok(NodeView {
            id: spec.id,
            component: spec.component,
            status: NodeStatus::Stopped,
        })
    }

    /// Removes a node and its incident edges, stopping its task first if a
    /// session is active.
    pub async fn remove_node(&self, id: &str) -> FlowResult<()> {
        // Extract the running task (if any) under the session lock, then
        // shut it down without holding any lock.
        let detached = {
            let mut session_guard = self.session.lock();
            if !self.graph.read().contains_node(id) {
                return Err(FlowError::NodeNotFound(id.to_string()));
            }
            session_guard.as_mut().and_then(|s| s.detach_node(id))
        };
        if let Some(detached) = detached {
            detached.shutdown().await;
        }

        {
            let mut session_guard = self.session.lock();
            self.graph.write().remove_node(id)?;
            // Forwarders on incident edges of a never-started node.
            if let Some(session) = session_guard.as_mut() {
                let stale: Vec<String> = session
                    .forwarders
                    .iter()
                    .filter(|(_, e)| e.edge.source_node == id || e.edge.target_node == id)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in stale {
                    session.forwarders.remove(&key);
                }
            }
        }

        self.statuses.remove(id);
        self.video.remove(id);
        log::info!("[Graph] Node {} removed", id);
        self.emitter.emit_graph(GraphEvent::NodeRemoved {
            node_id: id.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Adds an edge. With a session active and both endpoints running, the
    /// target is subscribed on the source's channel atomically.
    pub fn add_edge(&self, edge: EdgeSpec) -> FlowResult<EdgeSpec> {
        let mut session_guard = self.session.lock();
        self.graph.write().add_edge(edge.clone())?;
        if let Some(session) = session_guard.as_mut() {
            session.attach_edge(&edge);
        }
        log::info!("[Graph] Edge {} added", edge.id());
        self.emitter.emit_graph(GraphEvent::EdgeAdded {
            edge_id: edge.id(),
            timestamp: now_millis(),
        });
        Ok(edge)
    }

    /// Removes an edge, unsubscribing the target immediately when running.
    pub fn remove_edge(&self, edge: &EdgeSpec) -> FlowResult<()> {
        let mut session_guard = self.session.lock();
        self.graph.write().remove_edge(edge)?;
        if let Some(session) = session_guard.as_mut() {
            session.detach_edge(edge);
        }
        log::info!("[Graph] Edge {} removed", edge.id());
        self.emitter.emit_graph(GraphEvent::EdgeRemoved {
            edge_id: edge.id(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Snapshot of nodes for the control API, sorted by id.
    #[must_use]
    pub fn list_nodes(&self) -> Vec<NodeView> {
        self.graph
            .read()
            .nodes()
            .into_iter()
            .map(|spec| NodeView {
                status: self
                    .statuses
                    .get(&spec.id)
                    .map(|s| s.status)
                    .unwrap_or(NodeStatus::Stopped),
                id: spec.id,
                component: spec.component,
            })
            .collect()
    }

    /// Snapshot of edges for the control API.
    #[must_use]
    pub fn list_edges(&self) -> Vec<EdgeSpec> {
        self.graph.read().edges()
    }

    /// Runtime record for one node.
    #[must_use]
    pub fn node_state(&self, id: &str) -> Option<NodeRuntimeState> {
        self.statuses.get(id).map(|r| r.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Starts every node, sources to sinks. Returns the number of tasks
    /// spawned.
    ///
    /// A node whose component fails to construct enters `error`; the rest of
    /// the pipeline still starts.
    pub fn start_all(&self) -> FlowResult<usize> {
        let mut session_guard = self.session.lock();
        if session_guard.is_some() {
            return Err(FlowError::AlreadyRunning);
        }
        let graph = self.graph.read();
        let order = graph.topo_order();
        let edges = graph.edges();

        struct Prepared {
            node_id: String,
            component: Box<dyn crate::component::Component>,
            outputs: HashMap<String, Arc<Channel>>,
            has_inputs: bool,
        }

        let root = CancellationToken::new();
        let mut channels: HashMap<String, Arc<Channel>> = HashMap::new();
        let mut prepared: Vec<Prepared> = Vec::new();

        for id in &order {
            let spec = graph.node(id).expect("topo order covers stored nodes");
            let descriptor = match graph.descriptor_for(id) {
                Ok(d) => d.clone(),
                Err(e) => {
                    record_failure(&self.statuses, &self.emitter, id, e.to_string());
                    continue;
                }
            };
            match self.registry.instantiate(&spec.component, &spec.init) {
                Ok(component) => {
                    let mut outputs = HashMap::new();
                    for (slot, element_type) in &descriptor.outputs {
                        let channel = Arc::new(Channel::new(
                            id.clone(),
                            slot,
                            element_type.clone(),
                            self.config.channel_capacity,
                        ));
                        channels.insert(channel.name().to_string(), Arc::clone(&channel));
                        outputs.insert(slot.clone(), channel);
                    }
                    self.statuses.insert(
                        id.clone(),
                        NodeRuntimeState {
                            status: NodeStatus::Startup,
                            started_at: None,
                            error: None,
                        },
                    );
                    prepared.push(Prepared {
                        node_id: id.clone(),
                        component,
                        outputs,
                        has_inputs: !descriptor.inputs.is_empty(),
                    });
                }
                Err(e) => {
                    log::warn!("[Runtime] Node {} failed to construct: {}", id, e);
                    record_failure(&self.statuses, &self.emitter, id, e.to_string());
                }
            }
        }

        // Input funnels for nodes with inputs.
        let mut input_txs: HashMap<String, mpsc::Sender<StepInput>> = HashMap::new();
        let mut input_rxs: HashMap<String, mpsc::Receiver<StepInput>> = HashMap::new();
        for p in &prepared {
            if p.has_inputs {
                let (tx, rx) = mpsc::channel(self.config.input_queue_depth);
                input_txs.insert(p.node_id.clone(), tx);
                input_rxs.insert(p.node_id.clone(), rx);
            }
        }

        // Exactly one subscription per incoming edge, subscriber id = target
        // node id.
        let mut forwarders: HashMap<String, ForwarderEntry> = HashMap::new();
        for edge in &edges {
            let Some(channel) = channels.get(&edge.channel_name()) else {
                log::warn!("[Runtime] Skipping edge {}: source did not start", edge.id());
                continue;
            };
            let Some(tx) = input_txs.get(&edge.target_node) else {
                log::warn!("[Runtime] Skipping edge {}: target did not start", edge.id());
                continue;
            };
            match channel.subscribe(edge.target_node.clone()) {
                Ok(handle) => {
                    let join = spawn_forwarder(handle, edge.target_slot.clone(), tx.clone());
                    forwarders.insert(
                        edge.id(),
                        ForwarderEntry {
                            join,
                            edge: edge.clone(),
                        },
                    );
                }
                Err(e) => {
                    log::warn!("[Runtime] Could not subscribe {}: {}", edge.id(), e);
                }
            }
        }

        drop(graph);

        let spawned = prepared.len();
        let mut nodes: HashMap<String, NodeHandle> = HashMap::new();
        for p in prepared {
            let cancel = root.child_token();
            let ctx = NodeContext::new(
                p.node_id.clone(),
                p.outputs,
                Arc::clone(&self.inspector),
                Arc::clone(&self.video),
                cancel.clone(),
            );
            let input_rx = input_rxs.remove(&p.node_id);
            let input_tx = input_txs.get(&p.node_id).cloned();
            let join = tokio::spawn(node_task::run_node(NodeTask {
                node_id: p.node_id.clone(),
                component: p.component,
                ctx,
                cancel: cancel.clone(),
                input_rx,
                statuses: Arc::clone(&self.statuses),
                emitter: Arc::clone(&self.emitter),
            }));
            nodes.insert(
                p.node_id,
                NodeHandle {
                    cancel,
                    join,
                    input_tx,
                },
            );
        }

        *session_guard = Some(Session {
            cancel: root,
            channels,
            nodes,
            forwarders,
        });

        log::info!("[Runtime] Pipeline started with {} node(s)", spawned);
        self.emitter.emit_pipeline(PipelineEvent::Started {
            node_count: spawned,
            timestamp: now_millis(),
        });
        Ok(spawned)
    }

    /// Stops every node and tears down the session. Idempotent.
    ///
    /// Healthy nodes converge to `stopped`; nodes already in `error` keep
    /// their failure record until the next `start_all`.
    pub async fn stop_all(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            log::debug!("[Runtime] stop_all with no active session");
            return;
        };

        log::info!("[Runtime] Stopping pipeline...");
        session.cancel.cancel();

        for (id, handle) in session.nodes {
            if let Err(e) = handle.join.await {
                log::warn!("[Runtime] Node {} task join error: {}", id, e);
            }
        }
        // Node teardown closes each node's own outputs; closing the rest
        // covers channels whose producer never spawned.
        for channel in session.channels.values() {
            channel.close();
        }
        for (edge_id, entry) in session.forwarders {
            if let Err(e) = entry.join.await {
                log::warn!("[Runtime] Forwarder {} join error: {}", edge_id, e);
            }
        }

        for mut entry in self.statuses.iter_mut() {
            let state = entry.value_mut();
            state.started_at = None;
            if state.status != NodeStatus::Error {
                state.status = NodeStatus::Stopped;
            }
        }

        log::info!("[Runtime] Pipeline stopped");
        self.emitter.emit_pipeline(PipelineEvent::Stopped {
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sampling
    // ─────────────────────────────────────────────────────────────────────

    /// Point-in-time sample of every node and its channels, for the metrics
    /// engine. Channel counters are read under the channels' own locks and
    /// never block node tasks beyond that.
    #[must_use]
    pub fn sample(&self) -> Vec<NodeSample> {
        let session_guard = self.session.lock();
        let graph = self.graph.read();
        graph
            .nodes()
            .into_iter()
            .map(|spec| {
                let state = self
                    .statuses
                    .get(&spec.id)
                    .map(|r| r.clone())
                    .unwrap_or_default();
                let mut channel_samples: Vec<ChannelSample> = session_guard
                    .as_ref()
                    .map(|s| {
                        s.channels
                            .values()
                            .filter(|c| c.owner_node() == spec.id)
                            .map(|c| c.sample())
                            .collect()
                    })
                    .unwrap_or_default();
                channel_samples.sort_by(|a, b| a.name.cmp(&b.name));
                NodeSample {
                    id: spec.id,
                    component: spec.component,
                    status: state.status,
                    started_at: state.started_at,
                    error: state.error,
                    channels: channel_samples,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{
        Category, Component, ComponentDescriptor, ComponentRegistration, StepInput,
    };
    use crate::error::{ComponentError, ComponentResult};
    use crate::events::NoopEventEmitter;
    use crate::payload::Payload;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    type Store = Arc<Mutex<Vec<(String, i64)>>>;

    fn desc(
        name: &str,
        category: Category,
        inputs: &[(&str, &str)],
        outputs: &[(&str, &str)],
    ) -> ComponentDescriptor {
        ComponentDescriptor {
            name: name.to_string(),
            category,
            init: Default::default(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            outputs: outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Integer source emitting 1, 2, 3, … every millisecond.
    struct Pulse {
        next: i64,
    }

    #[async_trait]
    impl Component for Pulse {
        async fn step(&mut self, _input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ctx.publish("out", Payload::Int(self.next))?;
            self.next += 1;
            Ok(())
        }
    }

    /// Conduit that doubles integers.
    struct Double;

    #[async_trait]
    impl Component for Double {
        async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
            if let Some(StepInput {
                item: Payload::Int(v),
                ..
            }) = input
            {
                ctx.publish("out", Payload::Int(v * 2))?;
            }
            Ok(())
        }
    }

    /// Conduit that forwards twice, then fails on its third step.
    struct Fuse {
        steps: u32,
    }

    #[async_trait]
    impl Component for Fuse {
        async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()> {
            self.steps += 1;
            if self.steps >= 3 {
                return Err(ComponentError::failed("fuse blown on step 3"));
            }
            if let Some(StepInput { item, .. }) = input {
                ctx.publish("out", item)?;
            }
            Ok(())
        }
    }

    /// Sink recording (slot, value) pairs, optionally slow.
    struct Record {
        store: Store,
        delay: Duration,
    }

    #[async_trait]
    impl Component for Record {
        async fn step(&mut self, input: Option<StepInput>, _ctx: &NodeContext) -> ComponentResult<()> {
            if let Some(StepInput {
                slot,
                item: Payload::Int(v),
            }) = input
            {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.store.lock().push((slot, v));
            }
            Ok(())
        }
    }

    fn test_registry(store: &Store) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register(ComponentRegistration::new(
            desc("pulse", Category::Source, &[], &[("out", "int")]),
            |_| Ok(Box::new(Pulse { next: 1 })),
        ));
        registry.register(ComponentRegistration::new(
            desc("double", Category::Conduit, &[("in", "int")], &[("out", "int")]),
            |_| Ok(Box::new(Double)),
        ));
        registry.register(ComponentRegistration::new(
            desc("fuse", Category::Conduit, &[("in", "int")], &[("out", "int")]),
            |_| Ok(Box::new(Fuse { steps: 0 })),
        ));
        let s = Arc::clone(store);
        registry.register(ComponentRegistration::new(
            desc("record", Category::Sink, &[("in", "int")], &[]),
            move |_| {
                Ok(Box::new(Record {
                    store: Arc::clone(&s),
                    delay: Duration::ZERO,
                }))
            },
        ));
        let s = Arc::clone(store);
        registry.register(ComponentRegistration::new(
            desc("slow_record", Category::Sink, &[("in", "int")], &[]),
            move |_| {
                Ok(Box::new(Record {
                    store: Arc::clone(&s),
                    delay: Duration::from_millis(20),
                }))
            },
        ));
        let s = Arc::clone(store);
        registry.register(ComponentRegistration::new(
            desc(
                "pair_record",
                Category::Sink,
                &[("a", "int"), ("b", "int")],
                &[],
            ),
            move |_| {
                Ok(Box::new(Record {
                    store: Arc::clone(&s),
                    delay: Duration::ZERO,
                }))
            },
        ));
        registry
    }

    fn test_runtime(registry: ComponentRegistry) -> Arc<PipelineRuntime> {
        let config = RuntimeConfig {
            channel_capacity: 8,
            ..Default::default()
        };
        Arc::new(PipelineRuntime::new(
            Arc::new(registry),
            config,
            Arc::new(NoopEventEmitter),
            Arc::new(FrameInspector::new(64)),
            Arc::new(VideoTapRegistry::new(4)),
        ))
    }

    fn edge(src: &str, src_slot: &str, dst: &str, dst_slot: &str) -> EdgeSpec {
        EdgeSpec {
            source_node: src.to_string(),
            source_slot: src_slot.to_string(),
            target_node: dst.to_string(),
            target_slot: dst_slot.to_string(),
        }
    }

    async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..600 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn linear_pipeline_delivers_doubled_sequence() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("double", &Value::Null, Some("dbl".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("sink".into())).unwrap();
        runtime.add_edge(edge("src", "out", "dbl", "in")).unwrap();
        runtime.add_edge(edge("dbl", "out", "sink", "in")).unwrap();

        runtime.start_all().unwrap();
        wait_for("ten delivered items", || store.lock().len() >= 10).await;
        runtime.stop_all().await;

        let values: Vec<i64> = store.lock().iter().take(10).map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);
    }

    #[tokio::test]
    async fn fan_out_subscribers_see_same_sequence() {
        let store_a: Store = Default::default();
        let store_b: Store = Default::default();
        // record writes to store_a; record_b to its own store.
        let mut registry = test_registry(&store_a);
        let s = Arc::clone(&store_b);
        registry.register(ComponentRegistration::new(
            desc("record_b", Category::Sink, &[("in", "int")], &[]),
            move |_| {
                Ok(Box::new(Record {
                    store: Arc::clone(&s),
                    delay: Duration::ZERO,
                }))
            },
        ));
        let runtime = test_runtime(registry);
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("a".into())).unwrap();
        runtime.add_node("record_b", &Value::Null, Some("b".into())).unwrap();
        runtime.add_edge(edge("src", "out", "a", "in")).unwrap();
        runtime.add_edge(edge("src", "out", "b", "in")).unwrap();

        runtime.start_all().unwrap();
        wait_for("both sinks fed", || {
            store_a.lock().len() >= 8 && store_b.lock().len() >= 8
        })
        .await;
        runtime.stop_all().await;

        for store in [&store_a, &store_b] {
            let values: Vec<i64> = store.lock().iter().map(|(_, v)| *v).collect();
            let expected: Vec<i64> = (1..=values.len() as i64).collect();
            assert_eq!(values, expected, "each subscriber sees 1..N in order");
        }
    }

    #[tokio::test]
    async fn multi_input_node_steps_on_any_input() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("p1".into())).unwrap();
        runtime.add_node("pulse", &Value::Null, Some("p2".into())).unwrap();
        runtime.add_node("pair_record", &Value::Null, Some("sink".into())).unwrap();
        runtime.add_edge(edge("p1", "out", "sink", "a")).unwrap();
        runtime.add_edge(edge("p2", "out", "sink", "b")).unwrap();

        runtime.start_all().unwrap();
        wait_for("items from both slots", || {
            let store = store.lock();
            store.iter().any(|(slot, _)| slot == "a") && store.iter().any(|(slot, _)| slot == "b")
        })
        .await;
        runtime.stop_all().await;
    }

    #[tokio::test]
    async fn failure_is_isolated_to_the_erroring_node() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("fuse", &Value::Null, Some("mid".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("sink".into())).unwrap();
        runtime.add_edge(edge("src", "out", "mid", "in")).unwrap();
        runtime.add_edge(edge("mid", "out", "sink", "in")).unwrap();

        runtime.start_all().unwrap();
        wait_for("fuse to blow", || {
            runtime
                .node_state("mid")
                .is_some_and(|s| s.status == NodeStatus::Error)
        })
        .await;

        let mid = runtime.node_state("mid").unwrap();
        assert!(mid.error.unwrap().contains("fuse blown"));
        assert!(mid.started_at.is_none());

        // Upstream keeps producing, downstream keeps running on a closed
        // channel, and the two items forwarded before the failure survive.
        assert_eq!(runtime.node_state("src").unwrap().status, NodeStatus::Running);
        assert_eq!(runtime.node_state("sink").unwrap().status, NodeStatus::Running);
        wait_for("pre-failure items drained", || store.lock().len() >= 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.lock().len(), 2);

        runtime.stop_all().await;
        // Error record survives stop for inspection.
        assert_eq!(runtime.node_state("mid").unwrap().status, NodeStatus::Error);
    }

    #[tokio::test]
    async fn second_start_without_stop_conflicts() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();

        runtime.start_all().unwrap();
        assert!(matches!(runtime.start_all(), Err(FlowError::AlreadyRunning)));
        runtime.stop_all().await;

        // Stop/start cycle works.
        runtime.start_all().unwrap();
        runtime.stop_all().await;
    }

    #[tokio::test]
    async fn started_at_set_iff_running() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();

        assert!(runtime.node_state("src").unwrap().started_at.is_none());
        runtime.start_all().unwrap();
        wait_for("node running", || {
            runtime
                .node_state("src")
                .is_some_and(|s| s.status == NodeStatus::Running)
        })
        .await;
        assert!(runtime.node_state("src").unwrap().started_at.is_some());

        runtime.stop_all().await;
        let state = runtime.node_state("src").unwrap();
        assert_eq!(state.status, NodeStatus::Stopped);
        assert!(state.started_at.is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_accumulates_lag_without_stalling_fast_one() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("fast".into())).unwrap();
        runtime.add_node("slow_record", &Value::Null, Some("slow".into())).unwrap();
        runtime.add_edge(edge("src", "out", "fast", "in")).unwrap();
        runtime.add_edge(edge("src", "out", "slow", "in")).unwrap();

        runtime.start_all().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let samples = runtime.sample();
        runtime.stop_all().await;

        let src = samples.iter().find(|s| s.id == "src").unwrap();
        let channel = &src.channels[0];
        let sub = |id: &str| {
            channel
                .subscribers
                .iter()
                .find(|s| s.subscriber_id == id)
                .unwrap()
                .clone()
        };
        let fast = sub("fast");
        let slow = sub("slow");

        // ~300 produced at 1ms cadence vs a 20ms/item consumer with an
        // 8-deep buffer: the slow side must have aged items out.
        assert!(slow.lag > 0, "slow subscriber should have dropped items");
        assert!(fast.lag < slow.lag);
        assert_eq!(fast.msg_count, slow.msg_count, "both see every publish");
    }

    #[tokio::test]
    async fn live_edge_edits_apply_to_running_session() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("sink".into())).unwrap();

        runtime.start_all().unwrap();
        wait_for("source running", || {
            runtime
                .node_state("src")
                .is_some_and(|s| s.status == NodeStatus::Running)
        })
        .await;
        assert!(store.lock().is_empty());

        // Wire the sink in while running.
        runtime.add_edge(edge("src", "out", "sink", "in")).unwrap();
        wait_for("live edge delivers", || !store.lock().is_empty()).await;

        // Unwire: delivery stops, modulo items already in flight.
        runtime.remove_edge(&edge("src", "out", "sink", "in")).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = store.lock().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.lock().len() <= settled + 2);

        runtime.stop_all().await;
    }

    #[tokio::test]
    async fn remove_node_stops_its_task_first() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        runtime.add_node("pulse", &Value::Null, Some("src".into())).unwrap();
        runtime.add_node("record", &Value::Null, Some("sink".into())).unwrap();
        runtime.add_edge(edge("src", "out", "sink", "in")).unwrap();

        runtime.start_all().unwrap();
        wait_for("delivery", || !store.lock().is_empty()).await;

        runtime.remove_node("src").await.unwrap();
        assert!(!runtime.has_node("src"));
        assert!(runtime.list_edges().is_empty());
        // The sink node survives the upstream removal.
        assert_eq!(
            runtime.node_state("sink").unwrap().status,
            NodeStatus::Running
        );

        runtime.stop_all().await;
    }

    #[tokio::test]
    async fn remove_absent_node_is_not_found() {
        let store: Store = Default::default();
        let runtime = test_runtime(test_registry(&store));
        assert!(matches!(
            runtime.remove_node("ghost").await,
            Err(FlowError::NodeNotFound(_))
        ));
    }
}
