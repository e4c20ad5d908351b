//! Component model: the trait nodes implement, their descriptors, and the
//! context handed to a running node.
//!
//! A component describes itself once (name, category, slots, init schema) and
//! is instantiated per node. The runtime drives instances through the
//! `start → step… → stop` contract; `step` receives one item from whichever
//! input slot produced, or `None` for sources, and publishes through the
//! [`NodeContext`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::error::{ComponentError, ComponentResult};
use crate::inspector::FrameInspector;
use crate::payload::Payload;
use crate::video::VideoTapRegistry;

pub mod builtin;
pub mod registry;
pub mod schema;

pub use registry::{ComponentRegistration, ComponentRegistry};

/// Categorical label for a component.
///
/// Ordering matters: `list()` sorts by category then name, and the derive
/// follows declaration order (sources first, sinks last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Produces items, has no inputs.
    Source,
    /// Consumes and produces.
    Conduit,
    /// Consumes items, has no outputs.
    Sink,
}

/// Static description of a component class, as sent to the editor.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescriptor {
    /// Unique component name.
    pub name: String,
    /// Source, conduit, or sink.
    pub category: Category,
    /// Constructor parameter schemas (§6.3 dialect), keyed by parameter name.
    pub init: BTreeMap<String, Value>,
    /// Input slot name → declared element type.
    pub inputs: BTreeMap<String, String>,
    /// Output slot name → declared element type.
    pub outputs: BTreeMap<String, String>,
}

impl ComponentDescriptor {
    /// Checks the category/slot invariants (sources have no inputs, sinks no
    /// outputs). Violations are registration bugs, caught at process start.
    pub(crate) fn assert_invariants(&self) {
        match self.category {
            Category::Source => assert!(
                self.inputs.is_empty(),
                "source component {} declares inputs",
                self.name
            ),
            Category::Sink => assert!(
                self.outputs.is_empty(),
                "sink component {} declares outputs",
                self.name
            ),
            Category::Conduit => {}
        }
    }
}

/// One delivered input item: which slot produced, and the item itself.
#[derive(Debug)]
pub struct StepInput {
    pub slot: String,
    pub item: Payload,
}

/// Handle a running node uses to interact with the runtime.
///
/// Owns the node's output channels; publishing routes through the frame
/// inspector for the `/frames` debug stream.
pub struct NodeContext {
    node_id: String,
    outputs: HashMap<String, Arc<Channel>>,
    inspector: Arc<FrameInspector>,
    video: Arc<VideoTapRegistry>,
    cancel: CancellationToken,
}

impl NodeContext {
    pub(crate) fn new(
        node_id: String,
        outputs: HashMap<String, Arc<Channel>>,
        inspector: Arc<FrameInspector>,
        video: Arc<VideoTapRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node_id,
            outputs,
            inspector,
            video,
            cancel,
        }
    }

    /// Id of the node this context belongs to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Publishes one item to the named output slot.
    ///
    /// Publishing to a closed channel is a silent no-op (the producer keeps
    /// running); an unknown slot is a component bug and errors.
    pub fn publish(&self, slot: &str, item: Payload) -> ComponentResult<()> {
        let Some(channel) = self.outputs.get(slot) else {
            return Err(ComponentError::failed(format!(
                "unknown output slot '{}' on node {}",
                slot, self.node_id
            )));
        };
        self.inspector.record(&self.node_id, slot, &item);
        channel.publish(item);
        Ok(())
    }

    /// Forwards an encoded JPEG frame to this node's video tap.
    ///
    /// Used by visual sinks backing `/video/ws/{node_id}`.
    pub fn emit_video(&self, frame: Bytes) {
        self.video.publish(&self.node_id, frame);
    }

    /// Whether the runtime has requested this node to stop.
    ///
    /// Long-running `step` implementations should poll this between units of
    /// work; the runtime only interrupts at `receive` boundaries.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes all output channels. Called by the runtime on every exit path.
    pub(crate) fn close_outputs(&self) {
        for channel in self.outputs.values() {
            channel.close();
        }
    }
}

/// The contract every component implements.
///
/// `step` is called once per delivered input item — or repeatedly with
/// `None` for sources, which pace themselves (a source that returns without
/// suspending will be called again immediately).
#[async_trait]
pub trait Component: Send {
    /// One-time setup before the node enters `running`.
    async fn start(&mut self, _ctx: &NodeContext) -> ComponentResult<()> {
        Ok(())
    }

    /// The work function.
    async fn step(&mut self, input: Option<StepInput>, ctx: &NodeContext) -> ComponentResult<()>;

    /// Teardown. Runs on every termination path: normal stop, error, cancel.
    async fn stop(&mut self) {}
}
