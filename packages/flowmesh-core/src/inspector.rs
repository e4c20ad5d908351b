//! Frame inspector: a bounded ring of the most recent pipeline messages.
//!
//! Every publish through a node context is summarized here so the editor's
//! debug panel (`GET /frames`) can show what is flowing without attaching to
//! individual channels. Records are summaries, not payload copies; large
//! buffers contribute only their length and a short preview.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::payload::Payload;
use crate::utils::now_secs_f64;

/// Summary of one published message.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    /// Wall-clock seconds.
    pub timestamp: f64,
    /// Producing node id.
    pub node: String,
    /// Output slot the message left through.
    pub slot: String,
    /// Payload type name.
    pub kind: String,
    /// Payload size in bytes (0 for scalar types).
    pub bytes: usize,
    /// Short human-readable rendering.
    pub preview: String,
}

/// Ring buffer of recent [`FrameRecord`]s plus a live broadcast feed.
pub struct FrameInspector {
    capacity: usize,
    ring: Mutex<VecDeque<FrameRecord>>,
    tx: broadcast::Sender<FrameRecord>,
}

impl FrameInspector {
    /// Creates an inspector retaining up to `capacity` recent records.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            tx,
        }
    }

    /// Records one published message.
    pub fn record(&self, node: &str, slot: &str, payload: &Payload) {
        let record = FrameRecord {
            timestamp: now_secs_f64(),
            node: node.to_string(),
            slot: slot.to_string(),
            kind: payload.type_name().to_string(),
            bytes: payload.byte_len(),
            preview: payload.preview(),
        };
        {
            let mut ring = self.ring.lock();
            if ring.len() >= self.capacity {
                ring.pop_front();
            }
            ring.push_back(record.clone());
        }
        // Broadcast is best-effort; no receivers is the common case.
        let _ = self.tx.send(record);
    }

    /// Atomically snapshots the ring and subscribes to the live feed.
    ///
    /// The ring lock is held across the subscribe so a record is never both
    /// replayed and re-delivered, and never lost between the two.
    pub fn subscribe_with_replay(&self) -> (Vec<FrameRecord>, broadcast::Receiver<FrameRecord>) {
        let ring = self.ring.lock();
        let rx = self.tx.subscribe();
        (ring.iter().cloned().collect(), rx)
    }

    /// Snapshot of the retained records, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<FrameRecord> {
        self.ring.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_beyond_capacity() {
        let inspector = FrameInspector::new(3);
        for i in 0..5 {
            inspector.record("src", "out", &Payload::Int(i));
        }
        let recent = inspector.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].preview, "2");
        assert_eq!(recent[2].preview, "4");
    }

    #[tokio::test]
    async fn live_feed_delivers_records() {
        let inspector = FrameInspector::new(8);
        let (replay, mut rx) = inspector.subscribe_with_replay();
        assert!(replay.is_empty());

        inspector.record("asr", "text", &Payload::Text("hello".into()));
        let record = rx.recv().await.unwrap();
        assert_eq!(record.node, "asr");
        assert_eq!(record.kind, "text");
        assert_eq!(record.bytes, 5);
    }
}
