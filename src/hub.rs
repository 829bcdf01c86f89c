//! Fan-out of live events to connected viewers.
//!
//! Each viewer is an [`EventSink`]. Delivery is best-effort: a sink that
//! fails is dropped from the registry and the remaining sinks still get the
//! event. Publishing snapshots the registry before delivering, so sinks can
//! be added or removed while a publish is in flight.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use hyper::body::Bytes;
use parking_lot::RwLock;
use pingwatch_types::StreamEvent;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{PingwatchError, Result};

/// Identifier of a registered sink.
pub type SubscriberId = u64;

const HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

/// Something that accepts encoded event frames.
pub trait EventSink: Send + Sync + Debug {
    /// Hand one frame to the sink without blocking.
    fn deliver(&self, frame: &Bytes) -> Result<()>;
}

/// A sink backed by a bounded channel.
///
/// A full channel counts as a failure: a viewer that cannot keep up is
/// dropped and gets a fresh history when it reconnects.
#[derive(Debug)]
pub struct ChannelSink {
    id: SubscriberId,
    tx: mpsc::Sender<Bytes>,
}

impl EventSink for ChannelSink {
    fn deliver(&self, frame: &Bytes) -> Result<()> {
        self.tx
            .try_send(frame.clone())
            .map_err(|_| PingwatchError::SinkDelivery(self.id))
    }
}

/// Encode an event as one event-stream record.
pub fn encode_frame(event: &StreamEvent) -> Result<Bytes> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Registry of live sinks.
#[derive(Debug, Default)]
pub struct Hub {
    next_id: AtomicU64,
    sinks: RwLock<BTreeMap<SubscriberId, Arc<dyn EventSink>>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an identifier for a sink about to be registered.
    pub fn next_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a sink under `id`.
    pub fn register(&self, id: SubscriberId, sink: Arc<dyn EventSink>) {
        self.sinks.write().insert(id, sink);
    }

    /// Create a channel-backed subscription.
    ///
    /// `initial` frames are queued before the sink becomes visible to
    /// publishers, so they always arrive first.
    pub fn subscribe(self: &Arc<Self>, buffer: usize, initial: &[Bytes]) -> Subscription {
        let id = self.next_id();
        let (tx, rx) = mpsc::channel(buffer.max(initial.len() + 1));
        for frame in initial {
            // Capacity covers every initial frame
            let _ = tx.try_send(frame.clone());
        }
        self.register(id, Arc::new(ChannelSink { id, tx }));
        debug!(subscriber = id, "subscriber connected");

        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Remove a sink. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.sinks.write().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber removed");
        }
        removed
    }

    /// Encode `event` once and deliver it to every sink.
    ///
    /// Returns the number of sinks that accepted it.
    pub fn publish(&self, event: &StreamEvent) -> usize {
        match encode_frame(event) {
            Ok(frame) => self.publish_frame(&frame),
            Err(e) => {
                error!(kind = event.kind(), error = %e, "failed to encode event");
                0
            }
        }
    }

    /// Send a keep-alive comment so dead connections surface.
    pub fn heartbeat(&self) -> usize {
        self.publish_frame(&Bytes::from_static(HEARTBEAT_FRAME))
    }

    /// Deliver an encoded frame to every sink, dropping the ones that fail.
    pub fn publish_frame(&self, frame: &Bytes) -> usize {
        let sinks: Vec<(SubscriberId, Arc<dyn EventSink>)> = self
            .sinks
            .read()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut failed = Vec::new();
        for (id, sink) in &sinks {
            if let Err(e) = sink.deliver(frame) {
                debug!(subscriber = id, error = %e, "dropping subscriber");
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut registry = self.sinks.write();
            for id in &failed {
                registry.remove(id);
            }
        }

        sinks.len() - failed.len()
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Whether no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }
}

/// Receiving end of a channel-backed subscription.
///
/// Yields encoded frames. Dropping it unregisters the sink.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
    hub: Arc<Hub>,
}

impl Subscription {
    /// The subscriber's identifier.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a frame if one is queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pingwatch_types::{LiveUpdate, Sample};

    #[derive(Debug, Default)]
    struct RecordingSink {
        frames: Mutex<Vec<Bytes>>,
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, frame: &Bytes) -> Result<()> {
            self.frames.lock().push(frame.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn deliver(&self, _frame: &Bytes) -> Result<()> {
            Err(PingwatchError::SinkDelivery(0))
        }
    }

    fn ping() -> StreamEvent {
        StreamEvent::Ping(LiveUpdate {
            target: "1.1.1.1".to_string(),
            received: 1,
            lost: 0,
            loss_percent: 0.0,
            avg_rtt: Some(10.0),
            gaps: Vec::new(),
            point: Sample::reply(1, 10.0, 1000),
        })
    }

    #[test]
    fn frame_is_data_line_with_blank_terminator() {
        let frame = encode_frame(&ping()).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {\"type\":\"ping\""));
        assert!(text.ends_with("}\n\n"));
        assert_eq!(text.matches('\n').count(), 2);
    }

    #[test]
    fn publish_reaches_every_sink() {
        let hub = Hub::new();
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        hub.register(hub.next_id(), a.clone());
        hub.register(hub.next_id(), b.clone());

        assert_eq!(hub.publish(&ping()), 2);
        assert_eq!(a.frames.lock().len(), 1);
        assert_eq!(b.frames.lock().len(), 1);
    }

    #[test]
    fn failing_sink_is_dropped_without_affecting_others() {
        let hub = Hub::new();
        let good = Arc::new(RecordingSink::default());
        hub.register(hub.next_id(), Arc::new(BrokenSink));
        hub.register(hub.next_id(), good.clone());

        assert_eq!(hub.publish(&ping()), 1);
        assert_eq!(hub.len(), 1);

        assert_eq!(hub.publish(&ping()), 1);
        assert_eq!(good.frames.lock().len(), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = Hub::new();
        let id = hub.next_id();
        hub.register(id, Arc::new(RecordingSink::default()));

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(hub.is_empty());
    }

    #[test]
    fn subscription_receives_initial_frames_first() {
        let hub = Arc::new(Hub::new());
        let initial = Bytes::from_static(b"data: {}\n\n");
        let mut sub = hub.subscribe(4, &[initial.clone()]);

        hub.publish(&ping());

        assert_eq!(sub.try_recv(), Some(initial));
        let live = sub.try_recv().unwrap();
        assert!(live.starts_with(b"data: {\"type\":\"ping\""));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let hub = Arc::new(Hub::new());
        let sub = hub.subscribe(4, &[]);
        assert_eq!(hub.len(), 1);

        drop(sub);
        assert!(hub.is_empty());
    }

    #[test]
    fn full_subscriber_is_dropped() {
        let hub = Arc::new(Hub::new());
        let _sub = hub.subscribe(1, &[]);

        assert_eq!(hub.publish(&ping()), 1);
        // Buffer of one is now full
        assert_eq!(hub.publish(&ping()), 0);
        assert!(hub.is_empty());
    }

    #[test]
    fn heartbeat_is_a_comment_frame() {
        let hub = Arc::new(Hub::new());
        let mut sub = hub.subscribe(4, &[]);

        assert_eq!(hub.heartbeat(), 1);
        assert_eq!(sub.try_recv().as_deref(), Some(HEARTBEAT_FRAME));
    }

    #[tokio::test]
    async fn subscription_stream_yields_frames() {
        use futures_util::StreamExt;

        let hub = Arc::new(Hub::new());
        let mut sub = hub.subscribe(4, &[]);
        hub.publish(&ping());

        let frame = sub.next().await.unwrap();
        assert!(frame.starts_with(b"data: "));
    }
}
