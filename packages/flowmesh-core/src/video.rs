//! Per-node video frame taps.
//!
//! Visual sink nodes push encoded JPEG frames here; the WebSocket endpoint
//! `/video/ws/{node_id}` forwards them to the browser. Taps are created
//! lazily on first use from either side, so a viewer may attach before the
//! node produces its first frame.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

/// Registry of per-node JPEG frame broadcast channels.
pub struct VideoTapRegistry {
    taps: DashMap<String, broadcast::Sender<Bytes>>,
    capacity: usize,
}

impl VideoTapRegistry {
    /// Creates a registry whose taps buffer up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            taps: DashMap::new(),
            capacity,
        }
    }

    fn tap(&self, node_id: &str) -> broadcast::Sender<Bytes> {
        self.taps
            .entry(node_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publishes one frame for `node_id`. Dropped silently with no viewers.
    pub fn publish(&self, node_id: &str, frame: Bytes) {
        let _ = self.tap(node_id).send(frame);
    }

    /// Subscribes a viewer to `node_id`'s frames.
    pub fn subscribe(&self, node_id: &str) -> broadcast::Receiver<Bytes> {
        self.tap(node_id).subscribe()
    }

    /// Drops the tap for a removed node. Attached viewers observe a close.
    pub fn remove(&self, node_id: &str) {
        self.taps.remove(node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_subscriber() {
        let registry = VideoTapRegistry::new(4);
        let mut rx = registry.subscribe("preview");
        registry.publish("preview", Bytes::from_static(b"\xff\xd8jpeg"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"\xff\xd8jpeg"));
    }

    #[tokio::test]
    async fn remove_closes_viewers() {
        let registry = VideoTapRegistry::new(4);
        let mut rx = registry.subscribe("preview");
        registry.remove("preview");
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
