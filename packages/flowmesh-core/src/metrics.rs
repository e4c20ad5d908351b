//! Snapshot-based metrics engine.
//!
//! Samples every node and channel on a fixed cadence (default 500 ms),
//! computes per-interval deltas against the previous sample's cumulative
//! counters, and broadcasts [`MetricsSnapshot`]s to attached observers (the
//! `/metrics` SSE handler). Lag is reported as its current cumulative value;
//! the dashboard differences it per interval itself.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::scheduler::{NodeStatus, PipelineRuntime};
use crate::state::RuntimeConfig;
use crate::utils::now_secs_f64;

/// Per-subscriber metrics in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberMetrics {
    pub msg_count: u64,
    pub byte_count: u64,
    pub msg_count_delta: u64,
    pub byte_count_delta: u64,
    /// Cumulative items dropped for this subscriber, not a delta.
    pub lag: u64,
}

/// Per-channel metrics in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMetrics {
    pub msg_count: u64,
    pub byte_count: u64,
    pub msg_count_delta: u64,
    pub byte_count_delta: u64,
    /// Wall-clock seconds of the last publish, if any.
    pub last_send_time: Option<f64>,
    /// Max queue length across subscribers.
    pub buffer_depth: usize,
    pub subscribers: BTreeMap<String, SubscriberMetrics>,
}

/// Per-node metrics in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetrics {
    pub status: NodeStatus,
    pub started_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Keyed by channel name, `<node_id>.<slot>`.
    pub channels: BTreeMap<String, ChannelMetrics>,
}

/// One timestamped metrics record covering every node and channel.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Wall-clock seconds.
    pub timestamp: f64,
    pub nodes: BTreeMap<String, NodeMetrics>,
}

/// Cumulative (msg, byte) counters held from the previous sample.
type PrevCounters = HashMap<String, (u64, u64)>;

/// Delta against the previous cumulative value.
///
/// Channels are recreated with zeroed counters on every session start; a
/// current value below the previous one means such a reset, and the full
/// current value is the interval's delta.
fn delta(prev: Option<&(u64, u64)>, msg: u64, bytes: u64) -> (u64, u64) {
    match prev {
        Some(&(prev_msg, prev_bytes)) if prev_msg <= msg && prev_bytes <= bytes => {
            (msg - prev_msg, bytes - prev_bytes)
        }
        _ => (msg, bytes),
    }
}

/// Periodic sampler over a [`PipelineRuntime`].
pub struct MetricsEngine {
    runtime: Arc<PipelineRuntime>,
    tx: broadcast::Sender<MetricsSnapshot>,
    sample_interval: Duration,
}

impl MetricsEngine {
    /// Creates an engine sampling at the configured interval.
    pub fn new(runtime: Arc<PipelineRuntime>, config: &RuntimeConfig) -> Self {
        let (tx, _) = broadcast::channel(config.metrics_channel_capacity);
        Self {
            runtime,
            tx,
            sample_interval: Duration::from_millis(config.metrics_interval_ms),
        }
    }

    /// Subscribes an observer to the snapshot feed.
    pub fn subscribe(&self) -> broadcast::Receiver<MetricsSnapshot> {
        self.tx.subscribe()
    }

    /// Spawns the sampling loop. Runs until `cancel` fires.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) {
        tokio::spawn(async move {
            self.run(cancel).await;
        });
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.sample_interval);
        // A stalled sampler should not burst-replay missed ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut prev: PrevCounters = HashMap::new();

        log::debug!(
            "[Metrics] Sampling every {}ms",
            self.sample_interval.as_millis()
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Metrics] Sampler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let snapshot = self.collect(&mut prev);
                    // No observers is the idle case, not an error.
                    let _ = self.tx.send(snapshot);
                }
            }
        }
    }

    /// Builds one snapshot and rolls the previous-counter state forward.
    fn collect(&self, prev: &mut PrevCounters) -> MetricsSnapshot {
        let timestamp = now_secs_f64();
        let mut next_prev: PrevCounters = HashMap::new();
        let mut nodes = BTreeMap::new();

        for node in self.runtime.sample() {
            let mut channels = BTreeMap::new();
            for channel in node.channels {
                let (msg_count_delta, byte_count_delta) = delta(
                    prev.get(&channel.name),
                    channel.msg_count,
                    channel.byte_count,
                );
                next_prev.insert(
                    channel.name.clone(),
                    (channel.msg_count, channel.byte_count),
                );

                let mut subscribers = BTreeMap::new();
                for sub in channel.subscribers {
                    let key = format!("{}/{}", channel.name, sub.subscriber_id);
                    let (sub_msg_delta, sub_byte_delta) =
                        delta(prev.get(&key), sub.msg_count, sub.byte_count);
                    next_prev.insert(key, (sub.msg_count, sub.byte_count));
                    subscribers.insert(
                        sub.subscriber_id,
                        SubscriberMetrics {
                            msg_count: sub.msg_count,
                            byte_count: sub.byte_count,
                            msg_count_delta: sub_msg_delta,
                            byte_count_delta: sub_byte_delta,
                            lag: sub.lag,
                        },
                    );
                }

                channels.insert(
                    channel.name.clone(),
                    ChannelMetrics {
                        msg_count: channel.msg_count,
                        byte_count: channel.byte_count,
                        msg_count_delta,
                        byte_count_delta,
                        last_send_time: channel.last_send_millis.map(|ms| ms as f64 / 1000.0),
                        buffer_depth: channel.buffer_depth,
                        subscribers,
                    },
                );
            }

            nodes.insert(
                node.id,
                NodeMetrics {
                    status: node.status,
                    started_at: node.started_at,
                    error: node.error,
                    channels,
                },
            );
        }

        // Dropping stale keys keeps a removed channel from skewing a later
        // channel that happens to reuse its name.
        *prev = next_prev;
        MetricsSnapshot { timestamp, nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::events::NoopEventEmitter;
    use crate::inspector::FrameInspector;
    use crate::video::VideoTapRegistry;
    use serde_json::{json, Value};

    #[test]
    fn delta_is_difference_when_monotonic() {
        assert_eq!(delta(Some(&(10, 100)), 15, 180), (5, 80));
        assert_eq!(delta(Some(&(10, 100)), 10, 100), (0, 0));
    }

    #[test]
    fn delta_treats_counter_reset_as_fresh() {
        // New session, counters restarted from zero.
        assert_eq!(delta(Some(&(500, 5000)), 3, 30), (3, 30));
        assert_eq!(delta(None, 7, 70), (7, 70));
    }

    fn engine_with_config(config: RuntimeConfig) -> (Arc<PipelineRuntime>, MetricsEngine) {
        let runtime = Arc::new(PipelineRuntime::new(
            Arc::new(ComponentRegistry::with_builtins()),
            config.clone(),
            Arc::new(NoopEventEmitter),
            Arc::new(FrameInspector::new(16)),
            Arc::new(VideoTapRegistry::new(4)),
        ));
        let engine = MetricsEngine::new(Arc::clone(&runtime), &config);
        (runtime, engine)
    }

    fn engine_over_builtin_graph() -> (Arc<PipelineRuntime>, MetricsEngine) {
        engine_with_config(RuntimeConfig::default())
    }

    #[tokio::test]
    async fn snapshots_cover_running_nodes_and_channels() {
        let (runtime, engine) = engine_over_builtin_graph();
        runtime
            .add_node("ticker", &json!({"interval_ms": 1}), Some("src".into()))
            .unwrap();
        runtime.add_node("scale", &Value::Null, Some("dbl".into())).unwrap();
        runtime
            .add_edge(crate::graph::EdgeSpec {
                source_node: "src".into(),
                source_slot: "out".into(),
                target_node: "dbl".into(),
                target_slot: "in".into(),
            })
            .unwrap();

        runtime.start_all().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut prev = HashMap::new();
        let first = engine.collect(&mut prev);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = engine.collect(&mut prev);
        runtime.stop_all().await;

        let src_first = &first.nodes["src"];
        let src_second = &second.nodes["src"];
        assert_eq!(src_first.status, NodeStatus::Running);
        assert!(src_first.started_at.is_some());

        let ch_first = &src_first.channels["src.out"];
        let ch_second = &src_second.channels["src.out"];
        assert!(ch_first.msg_count > 0);
        // Cumulative counters are monotonically non-decreasing.
        assert!(ch_second.msg_count >= ch_first.msg_count);
        assert!(ch_second.byte_count >= ch_first.byte_count);
        // Second interval's delta reflects only the interval.
        assert_eq!(
            ch_second.msg_count_delta,
            ch_second.msg_count - ch_first.msg_count
        );
        assert!(ch_first.last_send_time.is_some());
        assert!(ch_first.subscribers.contains_key("dbl"));

        // The conduit publishes into its own channel too.
        assert!(second.nodes["dbl"].channels.contains_key("dbl.out"));
    }

    #[tokio::test]
    async fn started_sampler_broadcasts_until_cancelled() {
        let config = RuntimeConfig {
            metrics_interval_ms: 10,
            ..Default::default()
        };
        let (runtime, engine) = engine_with_config(config);
        runtime.add_node("ticker", &Value::Null, Some("src".into())).unwrap();

        let engine = Arc::new(engine);
        let mut rx = engine.subscribe();
        let cancel = CancellationToken::new();
        Arc::clone(&engine).start(cancel.clone());

        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.nodes.contains_key("src"));

        cancel.cancel();
        // The loop exits and the sender side goes quiet; draining any
        // in-flight snapshots ends with a closed channel.
        drop(engine);
        loop {
            match rx.recv().await {
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    #[tokio::test]
    async fn idle_graph_snapshots_are_empty_but_well_formed() {
        let (runtime, engine) = engine_over_builtin_graph();
        runtime.add_node("ticker", &Value::Null, Some("src".into())).unwrap();

        let mut prev = HashMap::new();
        let snapshot = engine.collect(&mut prev);
        let node = &snapshot.nodes["src"];
        assert_eq!(node.status, NodeStatus::Stopped);
        assert!(node.started_at.is_none());
        assert!(node.channels.is_empty());
        assert!(snapshot.timestamp > 0.0);
        let _ = runtime;
    }
}
