//! # Event Publisher
//!
//! Defines the publishing side of the event bus and owns the subscription
//! table, the only shared mutable structure in the editor.
//!
//! ## Delivery model
//!
//! ```text
//! publish(topic) ──seq──▶ lane[topic] (FIFO) ──▶ H1, H2, ... (subscription order)
//! ```
//!
//! - Every topic with subscribers owns one dispatch lane: a tokio task fed
//!   by an unbounded channel. Messages on one topic are delivered strictly in
//!   publish order; different topics are independent.
//! - The handler set is captured at publish time, so a handler registered
//!   after a publish never sees it (no replay).
//! - Handlers are started in order, but the lane only waits for a handler's
//!   first poll. Async work still pending after that settles off the lane,
//!   so a handler that fails, panics or stalls never blocks its siblings.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared_types::topics::BusDiagnostics;
use shared_types::{BroadcastTopic, BusDiagnostic, Envelope, ReplyTo};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

use crate::error::{BusError, HandlerError, HandlerFailure};
use crate::subscriber::{
    typed_handler, Handler, HandlerResult, SubscriberSlot, Subscription, SubscriptionId,
    TopicStream,
};
use crate::DEFAULT_REQUEST_TIMEOUT;

/// Bus tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Deadline applied to `request` calls that do not set their own.
    pub request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One queued delivery.
struct Dispatch {
    envelope: Envelope,
    targets: Vec<Arc<SubscriberSlot>>,
    completion: Option<oneshot::Sender<Vec<HandlerFailure>>>,
}

#[derive(Default)]
struct TopicEntry {
    subscribers: Vec<Arc<SubscriberSlot>>,
    lane: Option<mpsc::UnboundedSender<Dispatch>>,
}

pub(crate) struct BusInner {
    topics: RwLock<HashMap<String, TopicEntry>>,
    /// Request topic → subscription of its current responder.
    pub(crate) responders: Mutex<HashMap<String, SubscriptionId>>,
    next_subscription: AtomicU64,
    clock: AtomicU64,
    events_published: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
    pub(crate) config: BusConfig,
}

/// In-memory, process-local event bus.
///
/// Cheap to clone; clones share the same subscription table. Publishing
/// requires a tokio runtime (lanes are tokio tasks).
#[derive(Clone)]
pub struct InMemoryEventBus {
    pub(crate) inner: Arc<BusInner>,
}

impl InMemoryEventBus {
    /// Create a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with explicit configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: RwLock::new(HashMap::new()),
                responders: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                clock: AtomicU64::new(0),
                events_published: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                config,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<BusInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<BusInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // =========================================================================
    // SUBSCRIBE / UNSUBSCRIBE
    // =========================================================================

    /// Register `handler` for every future publish on `topic`.
    pub fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        self.subscribe_as(topic, None, handler)
    }

    /// Register `handler` with an owner label used in diagnostics.
    pub fn subscribe_as(&self, topic: &str, owner: Option<&str>, handler: Handler) -> Subscription {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let owner = owner.map(str::to_string);
        let slot = Arc::new(SubscriberSlot::new(id, owner.clone(), handler));

        self.inner
            .topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .subscribers
            .push(slot);

        debug!(topic = %topic, subscription = %id, owner = ?owner, "Subscribed");
        Subscription::new(topic.to_string(), id, owner)
    }

    /// Typed subscription to a well-known broadcast topic.
    pub fn subscribe_topic<T, F>(&self, owner: Option<&str>, f: F) -> Subscription
    where
        T: BroadcastTopic + 'static,
        F: Fn(T::Payload, &Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_as(T::NAME, owner, typed_handler::<T, F>(f))
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Deliveries already queued for this subscription are skipped.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = {
            let mut topics = self.inner.topics.write();
            let Some(entry) = topics.get_mut(subscription.topic()) else {
                return false;
            };
            let Some(pos) = entry
                .subscribers
                .iter()
                .position(|slot| slot.id == subscription.id())
            else {
                return false;
            };
            let slot = entry.subscribers.remove(pos);
            slot.deactivate();
            if entry.subscribers.is_empty() {
                // Dropping the lane sender lets the lane task drain and exit.
                topics.remove(subscription.topic());
            }
            true
        };

        let mut responders = self.inner.responders.lock();
        if responders.get(subscription.topic()) == Some(&subscription.id()) {
            responders.remove(subscription.topic());
        }

        debug!(topic = %subscription.topic(), subscription = %subscription.id(), "Unsubscribed");
        removed
    }

    /// Stream every future publish on `topic`.
    #[must_use]
    pub fn stream(&self, topic: &str) -> TopicStream {
        TopicStream::open(self, topic)
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Fire-and-forget publish.
    ///
    /// Returns the number of handlers the message was queued for.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        self.dispatch(topic, payload, None, None, None)
    }

    /// Fire-and-forget publish stamped with the sender's name.
    pub fn publish_from(&self, sender: Option<&str>, topic: &str, payload: Value) -> usize {
        self.dispatch(topic, payload, sender.map(str::to_string), None, None)
    }

    /// Typed fire-and-forget publish on a well-known broadcast topic.
    ///
    /// # Errors
    ///
    /// `BusError::Payload` if the payload fails to serialize.
    pub fn publish_event<T: BroadcastTopic>(
        &self,
        sender: Option<&str>,
        payload: &T::Payload,
    ) -> Result<usize, BusError> {
        let value = serde_json::to_value(payload).map_err(|e| BusError::payload(T::NAME, &e))?;
        Ok(self.publish_from(sender, T::NAME, value))
    }

    /// Publish and wait until every handler's work has settled, including
    /// async work that outlives the handler's first poll.
    ///
    /// # Errors
    ///
    /// `BusError::HandlerFailed` with every failure if any handler failed;
    /// `BusError::Closed` if the lane shut down first.
    pub async fn publish_and_await(&self, topic: &str, payload: Value) -> Result<(), BusError> {
        self.publish_and_await_from(None, topic, payload).await
    }

    /// [`publish_and_await`](Self::publish_and_await) stamped with the sender's name.
    ///
    /// # Errors
    ///
    /// See [`publish_and_await`](Self::publish_and_await).
    pub async fn publish_and_await_from(
        &self,
        sender: Option<&str>,
        topic: &str,
        payload: Value,
    ) -> Result<(), BusError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(topic, payload, sender.map(str::to_string), None, Some(tx));

        match rx.await {
            Ok(failures) if failures.is_empty() => Ok(()),
            Ok(failures) => Err(BusError::HandlerFailed {
                topic: topic.to_string(),
                failures,
            }),
            Err(_) => Err(BusError::Closed {
                topic: topic.to_string(),
            }),
        }
    }

    pub(crate) fn dispatch(
        &self,
        topic: &str,
        payload: Value,
        sender: Option<String>,
        reply_to: Option<ReplyTo>,
        completion: Option<oneshot::Sender<Vec<HandlerFailure>>>,
    ) -> usize {
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.inner.topics.write();
        // Assigned under the table lock so per-topic queue order == seq order.
        let seq = self.inner.clock.fetch_add(1, Ordering::AcqRel) + 1;

        let Some(entry) = topics.get_mut(topic).filter(|e| !e.subscribers.is_empty()) else {
            debug!(topic = %topic, seq, "Event dropped (no subscribers)");
            if let Some(tx) = completion {
                let _ = tx.send(Vec::new());
            }
            return 0;
        };

        if entry.lane.is_none() {
            entry.lane = self.open_lane(topic);
        }
        let Some(lane) = entry.lane.as_ref() else {
            warn!(topic = %topic, seq, "Event dropped (no async runtime for delivery lane)");
            return 0;
        };

        let targets = entry.subscribers.clone();
        let receivers = targets.len();
        let mut envelope = Envelope::new(topic, seq, payload).with_sender(sender);
        if let Some(reply_to) = reply_to {
            envelope = envelope.with_reply_to(reply_to);
        }
        let request = envelope.is_request();

        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        if lane
            .send(Dispatch {
                envelope,
                targets,
                completion,
            })
            .is_err()
        {
            warn!(topic = %topic, seq, "Event dropped (delivery lane closed)");
            entry.lane = None;
            self.finish_one();
            return 0;
        }

        debug!(topic = %topic, seq, receivers, request, "Event published");
        receivers
    }

    fn open_lane(&self, topic: &str) -> Option<mpsc::UnboundedSender<Dispatch>> {
        let handle = Handle::try_current().ok()?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_lane(self.downgrade(), topic.to_string(), rx));
        debug!(topic = %topic, "Delivery lane opened");
        Some(tx)
    }

    /// Report a dispatch's failures, answer its awaiting publisher and mark
    /// it done.
    fn settle(
        &self,
        envelope: &Envelope,
        failures: Vec<HandlerFailure>,
        completion: Option<oneshot::Sender<Vec<HandlerFailure>>>,
    ) {
        self.report_failures(envelope, &failures);
        if let Some(tx) = completion {
            let _ = tx.send(failures);
        }
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    fn report_failures(&self, envelope: &Envelope, failures: &[HandlerFailure]) {
        for failure in failures {
            warn!(
                topic = %envelope.topic,
                seq = envelope.seq,
                subscription = %failure.subscription,
                owner = ?failure.owner,
                error = %failure.error,
                "Handler failed"
            );

            // Failures of diagnostics consumers are only logged.
            if envelope.topic == BusDiagnostics::NAME {
                continue;
            }
            let diagnostic = BusDiagnostic {
                topic: envelope.topic.clone(),
                seq: envelope.seq,
                subscription: failure.subscription.0,
                owner: failure.owner.clone(),
                error: failure.error.to_string(),
            };
            match serde_json::to_value(&diagnostic) {
                Ok(value) => {
                    self.dispatch(BusDiagnostics::NAME, value, None, None, None);
                }
                Err(e) => warn!(error = %e, "Failed to encode bus diagnostic"),
            }
        }
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Resolves once no delivery is queued or running on any lane.
    ///
    /// Work a handler spawns outside the bus (including RPC responder
    /// bodies) is not tracked.
    pub async fn quiesce(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .get(topic)
            .map_or(0, |e| e.subscribers.len())
    }

    /// Number of topics that currently have subscribers.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.topics.read().len()
    }

    /// Total publishes attempted, including ones nobody received.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }

    /// Logical clock value of the most recent publish (0 before any).
    #[must_use]
    pub fn current_seq(&self) -> u64 {
        self.inner.clock.load(Ordering::Acquire)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lane task: starts one topic's handlers strictly in publish order.
///
/// Each handler is polled once on the lane. Handlers still pending after
/// that first poll settle on a spawned task, so a slow or stalled handler
/// never holds back later messages for its siblings. The dispatch stays
/// in flight until its last handler settles.
async fn run_lane(bus: Weak<BusInner>, topic: String, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(Dispatch {
        envelope,
        targets,
        completion,
    }) = rx.recv().await
    {
        let (mut failures, pending) = start_handlers(&envelope, &targets);

        let Some(bus) = InMemoryEventBus::from_weak(&bus) else {
            break;
        };
        if pending.is_empty() {
            bus.settle(&envelope, failures, completion);
            continue;
        }

        debug!(topic = %topic, seq = envelope.seq, pending = pending.len(), "Handlers still running");
        tokio::spawn(async move {
            failures.extend(join_all(pending).await.into_iter().flatten());
            bus.settle(&envelope, failures, completion);
        });
    }
    debug!(topic = %topic, "Delivery lane closed");
}

type Outcome = Result<HandlerResult, Box<dyn Any + Send>>;
type PendingHandler = BoxFuture<'static, Option<HandlerFailure>>;

/// Invoke every still-active target in subscription order. Returns the
/// failures of handlers that finished on their first poll and the futures
/// of those that did not.
fn start_handlers(
    envelope: &Envelope,
    targets: &[Arc<SubscriberSlot>],
) -> (Vec<HandlerFailure>, Vec<PendingHandler>) {
    let mut failures = Vec::new();
    let mut pending = Vec::new();

    for slot in targets.iter().filter(|slot| slot.is_active()) {
        let mut run = match panic::catch_unwind(AssertUnwindSafe(|| (slot.handler)(envelope.clone()))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().boxed(),
            Err(p) => {
                failures.extend(failure_of(slot, Err(p)));
                continue;
            }
        };
        match (&mut run).now_or_never() {
            Some(outcome) => failures.extend(failure_of(slot, outcome)),
            None => {
                let slot = Arc::clone(slot);
                pending.push(async move { failure_of(&slot, run.await) }.boxed());
            }
        }
    }
    (failures, pending)
}

fn failure_of(slot: &SubscriberSlot, outcome: Outcome) -> Option<HandlerFailure> {
    let error = match outcome {
        Ok(Ok(())) => return None,
        Ok(Err(error)) => error,
        Err(panic) => HandlerError::from_panic(panic),
    };
    Some(HandlerFailure {
        subscription: slot.id,
        owner: slot.owner.clone(),
        error,
    })
}
