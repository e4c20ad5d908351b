//! The per-node task body and per-edge forwarders.
//!
//! Every node runs as one cooperative task. Sources drive themselves in a
//! produce loop; nodes with inputs step on whichever slot produced, fed by a
//! bounded funnel that one forwarder per incoming edge pushes into. The
//! funnel is kept shallow so backpressure lands in channel buffers, where
//! the drop-oldest policy and lag accounting live.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::SubscriberHandle;
use crate::component::{Component, NodeContext, StepInput};
use crate::events::{EventEmitter, NodeEvent};
use crate::utils::{monotonic_secs, now_millis};

use super::{NodeRuntimeState, NodeStatus};

/// Everything a node task needs, bundled for the spawn.
pub(super) struct NodeTask {
    pub node_id: String,
    pub component: Box<dyn Component>,
    pub ctx: NodeContext,
    pub cancel: CancellationToken,
    /// `None` for sources; they have no input funnel.
    pub input_rx: Option<mpsc::Receiver<StepInput>>,
    pub statuses: Arc<DashMap<String, NodeRuntimeState>>,
    pub emitter: Arc<dyn EventEmitter>,
}

enum LoopExit {
    Cancelled,
    Failed(String),
}

/// Runs one node to completion: `start`, the step loop, `stop`.
///
/// `stop()` runs and the output channels close on every exit path — clean
/// cancellation, step failure, and start failure alike.
pub(super) async fn run_node(task: NodeTask) {
    let NodeTask {
        node_id,
        mut component,
        ctx,
        cancel,
        input_rx,
        statuses,
        emitter,
    } = task;

    if let Err(e) = component.start(&ctx).await {
        log::warn!("[Runtime] Node {} failed during startup: {}", node_id, e);
        component.stop().await;
        ctx.close_outputs();
        record_failure(&statuses, &emitter, &node_id, e.to_string());
        return;
    }

    record_status(&statuses, &emitter, &node_id, NodeStatus::Running, Some(monotonic_secs()));
    log::debug!("[Runtime] Node {} running", node_id);

    let exit = match input_rx {
        None => source_loop(&mut component, &ctx, &cancel).await,
        Some(rx) => input_loop(&mut component, &ctx, &cancel, rx).await,
    };

    component.stop().await;
    ctx.close_outputs();

    match exit {
        LoopExit::Cancelled => {
            record_status(&statuses, &emitter, &node_id, NodeStatus::Stopped, None);
            log::debug!("[Runtime] Node {} stopped", node_id);
        }
        LoopExit::Failed(message) => {
            log::warn!("[Runtime] Node {} failed: {}", node_id, message);
            record_failure(&statuses, &emitter, &node_id, message);
        }
    }
}

/// Produce loop for sources: `step(None)` until cancelled.
///
/// The step future is raced against cancellation, so a source sleeping out
/// its pacing interval stops promptly.
async fn source_loop(
    component: &mut Box<dyn Component>,
    ctx: &NodeContext,
    cancel: &CancellationToken,
) -> LoopExit {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return LoopExit::Cancelled,

            result = component.step(None, ctx) => {
                if let Err(e) = result {
                    return LoopExit::Failed(e.to_string());
                }
            }
        }
    }
}

/// Read loop for nodes with inputs: step on whichever slot produced.
///
/// Once an item is in hand the step runs to completion; cancellation is only
/// observed between items. When every feed has gone away (all upstream
/// channels closed and their forwarders exited) the node parks until
/// `stop_all` — closure of inputs is "no more messages", not an error.
async fn input_loop(
    component: &mut Box<dyn Component>,
    ctx: &NodeContext,
    cancel: &CancellationToken,
    mut rx: mpsc::Receiver<StepInput>,
) -> LoopExit {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return LoopExit::Cancelled,

            next = rx.recv() => match next {
                Some(input) => {
                    if let Err(e) = component.step(Some(input), ctx).await {
                        return LoopExit::Failed(e.to_string());
                    }
                }
                None => {
                    cancel.cancelled().await;
                    return LoopExit::Cancelled;
                }
            }
        }
    }
}

/// Spawns the forwarder task for one edge: pull from the subscription, push
/// into the target's input funnel tagged with the target slot.
///
/// Exits when the subscription ends (channel closed or unsubscribed) or the
/// target's funnel is gone. While the target is busy the `send` awaits, so
/// excess items pile up in the channel buffer and age out there.
pub(super) fn spawn_forwarder(
    handle: SubscriberHandle,
    target_slot: String,
    tx: mpsc::Sender<StepInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = handle.recv().await {
            let input = StepInput {
                slot: target_slot.clone(),
                item,
            };
            if tx.send(input).await.is_err() {
                break;
            }
        }
    })
}

pub(super) fn record_status(
    statuses: &DashMap<String, NodeRuntimeState>,
    emitter: &Arc<dyn EventEmitter>,
    node_id: &str,
    status: NodeStatus,
    started_at: Option<f64>,
) {
    statuses.insert(
        node_id.to_string(),
        NodeRuntimeState {
            status,
            started_at,
            error: None,
        },
    );
    emitter.emit_node(NodeEvent::StatusChanged {
        node_id: node_id.to_string(),
        status: status.to_string(),
        timestamp: now_millis(),
    });
}

pub(super) fn record_failure(
    statuses: &DashMap<String, NodeRuntimeState>,
    emitter: &Arc<dyn EventEmitter>,
    node_id: &str,
    message: String,
) {
    statuses.insert(
        node_id.to_string(),
        NodeRuntimeState {
            status: NodeStatus::Error,
            started_at: None,
            error: Some(message.clone()),
        },
    );
    emitter.emit_node(NodeEvent::Failed {
        node_id: node_id.to_string(),
        error: message,
        timestamp: now_millis(),
    });
}
