//! The mutable pipeline graph: node specs and edges, as pure data.
//!
//! The graph owns no channels and no tasks — it is the editable description
//! the runtime reads when starting a session. Every edit operation is
//! validate-then-apply: a failed edit leaves the graph untouched.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::component::ComponentRegistry;
use crate::error::{FlowError, FlowResult};

/// One node in the graph: an instance-to-be of a registered component.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSpec {
    /// Unique node id.
    pub id: String,
    /// Registered component name.
    pub component: String,
    /// Normalized constructor arguments (schema-validated, defaults filled).
    pub init: Value,
}

/// One directed edge: `source_node.source_slot → target_node.target_slot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source_node: String,
    pub source_slot: String,
    pub target_node: String,
    pub target_slot: String,
}

impl EdgeSpec {
    /// Stable edge identifier, `src:slot->dst:slot`.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}:{}->{}:{}",
            self.source_node, self.source_slot, self.target_node, self.target_slot
        )
    }

    /// Name of the channel this edge subscribes to.
    #[must_use]
    pub fn channel_name(&self) -> String {
        format!("{}.{}", self.source_node, self.source_slot)
    }
}

/// In-memory DAG of node specs and edges.
pub struct GraphModel {
    registry: Arc<ComponentRegistry>,
    nodes: HashMap<String, NodeSpec>,
    edges: Vec<EdgeSpec>,
}

impl GraphModel {
    /// Creates an empty graph over the given component registry.
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            nodes: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a node. Generates an id when none is supplied.
    ///
    /// Validates that the component exists and that `init` satisfies its
    /// schema; the stored spec carries the normalized arguments.
    pub fn add_node(
        &mut self,
        component: &str,
        init: &Value,
        id: Option<String>,
    ) -> FlowResult<NodeSpec> {
        let normalized = self.registry.validate_args(component, init)?;
        let id = match id {
            Some(id) => {
                if self.nodes.contains_key(&id) {
                    return Err(FlowError::DuplicateId(id));
                }
                id
            }
            None => self.generate_id(component),
        };
        let spec = NodeSpec {
            id: id.clone(),
            component: component.to_string(),
            init: normalized,
        };
        self.nodes.insert(id, spec.clone());
        Ok(spec)
    }

    fn generate_id(&self, component: &str) -> String {
        loop {
            let suffix = Uuid::new_v4().simple().to_string();
            let id = format!("{}-{}", component, &suffix[..8]);
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// Removes a node and every incident edge.
    ///
    /// The caller (the runtime) is responsible for stopping the node's task
    /// first; the graph itself holds only data.
    pub fn remove_node(&mut self, id: &str) -> FlowResult<NodeSpec> {
        let spec = self
            .nodes
            .remove(id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        self.edges
            .retain(|e| e.source_node != id && e.target_node != id);
        Ok(spec)
    }

    /// Adds an edge after validating slots, types, uniqueness, acyclicity.
    pub fn add_edge(&mut self, edge: EdgeSpec) -> FlowResult<()> {
        let source = self.descriptor_for(&edge.source_node)?;
        let target = self.descriptor_for(&edge.target_node)?;

        let source_type = source.outputs.get(&edge.source_slot).ok_or_else(|| {
            FlowError::UnknownSlot(format!(
                "{} has no output slot '{}'",
                edge.source_node, edge.source_slot
            ))
        })?;
        let target_type = target.inputs.get(&edge.target_slot).ok_or_else(|| {
            FlowError::UnknownSlot(format!(
                "{} has no input slot '{}'",
                edge.target_node, edge.target_slot
            ))
        })?;

        if source_type != target_type {
            return Err(FlowError::TypeMismatch(format!(
                "{}.{} produces '{}' but {}.{} accepts '{}'",
                edge.source_node,
                edge.source_slot,
                source_type,
                edge.target_node,
                edge.target_slot,
                target_type
            )));
        }
        if self.edges.contains(&edge) {
            return Err(FlowError::DuplicateEdge(edge.id()));
        }
        if self.would_cycle(&edge) {
            return Err(FlowError::CycleDetected(edge.id()));
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Removes an edge matching the four-tuple.
    pub fn remove_edge(&mut self, edge: &EdgeSpec) -> FlowResult<()> {
        let before = self.edges.len();
        self.edges.retain(|e| e != edge);
        if self.edges.len() == before {
            return Err(FlowError::EdgeNotFound(edge.id()));
        }
        Ok(())
    }

    /// Looks up a node spec.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    /// Whether a node with this id exists.
    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Snapshot of all nodes, sorted by id for stable listings.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeSpec> {
        let mut nodes: Vec<NodeSpec> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Snapshot of all edges, in insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeSpec> {
        self.edges.clone()
    }

    /// Descriptor of a node's component.
    pub fn descriptor_for(&self, node_id: &str) -> FlowResult<&crate::component::ComponentDescriptor> {
        let spec = self
            .nodes
            .get(node_id)
            .ok_or_else(|| FlowError::NodeNotFound(node_id.to_string()))?;
        self.registry
            .descriptor(&spec.component)
            .ok_or_else(|| FlowError::ComponentNotFound(spec.component.clone()))
    }

    /// Nodes in topological order, sources first.
    ///
    /// The graph is kept acyclic by `add_edge`, so the walk always covers
    /// every node. Ties break on node id for determinism.
    #[must_use]
    pub fn topo_order(&self) -> Vec<String> {
        self.kahn_walk(None)
            .expect("stored graph must be acyclic")
    }

    fn would_cycle(&self, candidate: &EdgeSpec) -> bool {
        // Self-edges close the trivial cycle.
        if candidate.source_node == candidate.target_node {
            return true;
        }
        self.kahn_walk(Some(candidate)).is_none()
    }

    /// Kahn topological walk over the graph plus an optional candidate edge.
    /// Returns `None` if a cycle prevents completing the walk.
    fn kahn_walk(&self, extra: Option<&EdgeSpec>) -> Option<Vec<String>> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();

        let edges = self
            .edges
            .iter()
            .chain(extra.into_iter());
        for edge in edges {
            outgoing
                .entry(edge.source_node.as_str())
                .or_default()
                .push(edge.target_node.as_str());
            if let Some(count) = indegree.get_mut(edge.target_node.as_str()) {
                *count += 1;
            }
        }

        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<&str> = ready.into();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(targets) = outgoing.get(id) {
                for &target in targets {
                    if let Some(count) = indegree.get_mut(target) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }
}
