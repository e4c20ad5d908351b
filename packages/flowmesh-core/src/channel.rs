//! Typed publish/subscribe channel with per-subscriber buffering.
//!
//! One producer (the owning node's output slot), zero or more subscribers
//! (one per downstream edge). Each subscriber has its own bounded queue with
//! a drop-oldest policy: a slow consumer never blocks the producer or its
//! sibling subscribers, it just accumulates `lag`. Counters are cumulative;
//! the metrics engine computes deltas between snapshots.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{FlowError, FlowResult};
use crate::payload::Payload;
use crate::utils::now_millis;

/// State shared between the channel (producer side) and one subscriber's
/// receive handle. The queue mutex serializes the two sides.
struct SubscriberShared {
    queue: Mutex<VecDeque<Payload>>,
    notify: Notify,
    closed: AtomicBool,
    msg_count: AtomicU64,
    byte_count: AtomicU64,
    lag: AtomicU64,
}

impl SubscriberShared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            msg_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
            lag: AtomicU64::new(0),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Consumer-side handle returned by [`Channel::subscribe`].
pub struct SubscriberHandle {
    subscriber_id: String,
    shared: Arc<SubscriberShared>,
}

impl SubscriberHandle {
    /// Returns the subscriber id this handle consumes as.
    #[must_use]
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Receives the next item, suspending until one is available.
    ///
    /// After the channel closes (or this subscriber is detached), remaining
    /// buffered items are still delivered; `None` marks the end of the
    /// sequence.
    pub async fn recv(&self) -> Option<Payload> {
        loop {
            // Register for wakeup before checking the queue so a publish
            // between the check and the await still wakes us.
            let notified = self.shared.notify.notified();
            if let Some(item) = self.shared.queue.lock().pop_front() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }
}

/// Inner channel state behind one mutex.
struct ChannelInner {
    closed: bool,
    msg_count: u64,
    byte_count: u64,
    last_send_millis: Option<u64>,
    subscribers: HashMap<String, Arc<SubscriberShared>>,
}

/// Broadcast fan-out buffer attached to one output slot of one node.
pub struct Channel {
    name: String,
    owner_node: String,
    element_type: String,
    capacity: usize,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    /// Creates a channel named `<node_id>.<slot>` carrying `element_type`.
    pub fn new(
        owner_node: impl Into<String>,
        slot: &str,
        element_type: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let owner_node = owner_node.into();
        Self {
            name: format!("{owner_node}.{slot}"),
            owner_node,
            element_type: element_type.into(),
            capacity,
            inner: Mutex::new(ChannelInner {
                closed: false,
                msg_count: 0,
                byte_count: 0,
                last_send_millis: None,
                subscribers: HashMap::new(),
            }),
        }
    }

    /// Channel name, `<node_id>.<slot>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the producing node.
    #[must_use]
    pub fn owner_node(&self) -> &str {
        &self.owner_node
    }

    /// Declared element type string.
    #[must_use]
    pub fn element_type(&self) -> &str {
        &self.element_type
    }

    /// Attaches a subscriber and returns its receive handle.
    ///
    /// Fails with [`FlowError::AlreadySubscribed`] if the id is taken and
    /// [`FlowError::ChannelClosed`] after `close()`.
    pub fn subscribe(&self, subscriber_id: impl Into<String>) -> FlowResult<SubscriberHandle> {
        let subscriber_id = subscriber_id.into();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(FlowError::ChannelClosed(self.name.clone()));
        }
        if inner.subscribers.contains_key(&subscriber_id) {
            return Err(FlowError::AlreadySubscribed(format!(
                "{} on {}",
                subscriber_id, self.name
            )));
        }
        let shared = Arc::new(SubscriberShared::new());
        inner.subscribers.insert(subscriber_id.clone(), Arc::clone(&shared));
        Ok(SubscriberHandle {
            subscriber_id,
            shared,
        })
    }

    /// Detaches a subscriber, discarding anything left in its buffer.
    ///
    /// The subscriber's pending `recv` (if any) wakes and returns `None`.
    /// Unknown ids are ignored.
    pub fn unsubscribe(&self, subscriber_id: &str) {
        let removed = self.inner.lock().subscribers.remove(subscriber_id);
        if let Some(shared) = removed {
            shared.queue.lock().clear();
            shared.close();
        }
    }

    /// Publishes one item to every subscriber.
    ///
    /// A full subscriber queue drops its oldest item and charges that
    /// subscriber one `lag` before the new item is enqueued. Channel-level
    /// counters update even with zero subscribers. Never blocks; a no-op
    /// after `close()`.
    pub fn publish(&self, item: Payload) {
        let byte_len = item.byte_len() as u64;
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        // Channel-level accounting happens regardless of fan-out so an
        // unconnected producer is still visible in metrics.
        inner.msg_count += 1;
        inner.byte_count += byte_len;
        inner.last_send_millis = Some(now_millis());

        for shared in inner.subscribers.values() {
            {
                let mut queue = shared.queue.lock();
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    shared.lag.fetch_add(1, Ordering::Relaxed);
                }
                queue.push_back(item.clone());
            }
            shared.msg_count.fetch_add(1, Ordering::Relaxed);
            shared.byte_count.fetch_add(byte_len, Ordering::Relaxed);
            shared.notify.notify_one();
        }
    }

    /// Closes the channel: wakes all receivers, makes `publish` a no-op.
    ///
    /// Subscriber buffers are left intact so downstream consumers drain what
    /// was published before the close.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for shared in inner.subscribers.values() {
            shared.close();
        }
    }

    /// Returns whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Snapshots counters for the metrics engine.
    ///
    /// Uses the same locks `publish` takes, so sampled values are mutually
    /// consistent at channel level.
    #[must_use]
    pub fn sample(&self) -> ChannelSample {
        let inner = self.inner.lock();
        let mut subscribers: Vec<SubscriberSample> = inner
            .subscribers
            .iter()
            .map(|(id, shared)| SubscriberSample {
                subscriber_id: id.clone(),
                msg_count: shared.msg_count.load(Ordering::Relaxed),
                byte_count: shared.byte_count.load(Ordering::Relaxed),
                lag: shared.lag.load(Ordering::Relaxed),
                depth: shared.queue.lock().len(),
            })
            .collect();
        subscribers.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        let buffer_depth = subscribers.iter().map(|s| s.depth).max().unwrap_or(0);
        ChannelSample {
            name: self.name.clone(),
            owner_node: self.owner_node.clone(),
            msg_count: inner.msg_count,
            byte_count: inner.byte_count,
            last_send_millis: inner.last_send_millis,
            buffer_depth,
            subscribers,
        }
    }
}

/// Point-in-time counter snapshot of one channel.
#[derive(Debug, Clone)]
pub struct ChannelSample {
    pub name: String,
    pub owner_node: String,
    pub msg_count: u64,
    pub byte_count: u64,
    pub last_send_millis: Option<u64>,
    /// Max queue length across subscribers.
    pub buffer_depth: usize,
    pub subscribers: Vec<SubscriberSample>,
}

/// Point-in-time counter snapshot of one subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberSample {
    pub subscriber_id: String,
    pub msg_count: u64,
    pub byte_count: u64,
    /// Items dropped from this subscriber's buffer under capacity pressure.
    pub lag: u64,
    pub depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_channel(capacity: usize) -> Channel {
        Channel::new("src", "out", "int", capacity)
    }

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let channel = int_channel(8);
        let handle = channel.subscribe("sink").unwrap();

        for i in 1..=5 {
            channel.publish(Payload::Int(i));
        }
        for i in 1..=5 {
            assert_eq!(handle.recv().await, Some(Payload::Int(i)));
        }
    }

    #[tokio::test]
    async fn drops_oldest_and_counts_lag_when_full() {
        let channel = int_channel(4);
        let handle = channel.subscribe("slow").unwrap();

        for i in 1..=10 {
            channel.publish(Payload::Int(i));
        }

        // Oldest six dropped, newest four retained in order.
        for i in 7..=10 {
            assert_eq!(handle.recv().await, Some(Payload::Int(i)));
        }
        let sample = channel.sample();
        assert_eq!(sample.subscribers[0].lag, 6);
        assert_eq!(sample.subscribers[0].msg_count, 10);
    }

    #[tokio::test]
    async fn fan_out_is_independent_per_subscriber() {
        let channel = int_channel(16);
        let a = channel.subscribe("a").unwrap();
        let b = channel.subscribe("b").unwrap();

        for i in 1..=8 {
            channel.publish(Payload::Int(i));
        }
        for i in 1..=8 {
            assert_eq!(a.recv().await, Some(Payload::Int(i)));
        }
        // Consuming a does not disturb b.
        for i in 1..=8 {
            assert_eq!(b.recv().await, Some(Payload::Int(i)));
        }
    }

    #[tokio::test]
    async fn zero_subscriber_publish_still_counts() {
        let channel = int_channel(4);
        channel.publish(Payload::Text("hello".into()));

        let sample = channel.sample();
        assert_eq!(sample.msg_count, 1);
        assert_eq!(sample.byte_count, 5);
        assert!(sample.last_send_millis.is_some());
        assert_eq!(sample.buffer_depth, 0);
    }

    #[tokio::test]
    async fn close_wakes_receiver_after_drain() {
        let channel = Arc::new(int_channel(4));
        let handle = channel.subscribe("sink").unwrap();
        channel.publish(Payload::Int(1));

        let waiter = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(item) = handle.recv().await {
                received.push(item);
            }
            received
        });

        // Give the receiver time to drain and park, then close.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        channel.close();

        let received = waiter.await.unwrap();
        assert_eq!(received, vec![Payload::Int(1)]);
    }

    #[tokio::test]
    async fn publish_after_close_is_noop() {
        let channel = int_channel(4);
        let handle = channel.subscribe("sink").unwrap();
        channel.close();
        channel.publish(Payload::Int(1));

        assert_eq!(handle.recv().await, None);
        assert_eq!(channel.sample().msg_count, 0);
    }

    #[test]
    fn duplicate_subscriber_rejected() {
        let channel = int_channel(4);
        channel.subscribe("sink").unwrap();
        assert!(matches!(
            channel.subscribe("sink"),
            Err(FlowError::AlreadySubscribed(_))
        ));
    }

    #[tokio::test]
    async fn unsubscribe_discards_buffer_and_wakes() {
        let channel = int_channel(4);
        let handle = channel.subscribe("sink").unwrap();
        channel.publish(Payload::Int(1));
        channel.publish(Payload::Int(2));

        channel.unsubscribe("sink");

        // Buffer was discarded, handle is closed.
        assert_eq!(handle.recv().await, None);
        assert_eq!(channel.subscriber_count(), 0);

        // Same id may re-subscribe afterwards (fresh state).
        let handle = channel.subscribe("sink").unwrap();
        channel.publish(Payload::Int(3));
        assert_eq!(handle.recv().await, Some(Payload::Int(3)));
        assert_eq!(channel.sample().subscribers[0].lag, 0);
    }

    #[test]
    fn sample_reports_max_depth_across_subscribers() {
        let channel = int_channel(8);
        let _a = channel.subscribe("a").unwrap();
        let b = channel.subscribe("b").unwrap();

        for i in 1..=4 {
            channel.publish(Payload::Int(i));
        }
        // Drain b only; a still holds 4.
        for _ in 0..4 {
            let popped = b.shared.queue.lock().pop_front();
            assert!(popped.is_some());
        }
        let sample = channel.sample();
        assert_eq!(sample.buffer_depth, 4);
    }
}
