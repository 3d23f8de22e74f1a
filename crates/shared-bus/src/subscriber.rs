//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: handler types, the
//! [`Subscription`] handle used for removal, and [`TopicStream`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use shared_types::{BroadcastTopic, Envelope};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

use crate::error::HandlerError;
use crate::publisher::InMemoryEventBus;

/// Outcome of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// A bus handler. Invoked once per delivered envelope.
pub type Handler = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |env| f(env).boxed())
}

/// Wrap a synchronous closure as a [`Handler`].
pub fn sync_handler<F>(f: F) -> Handler
where
    F: Fn(Envelope) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(move |env| future::ready(f(env)).boxed())
}

/// Wrap a synchronous closure that receives the typed payload of `T`.
///
/// A payload that does not match `T::Payload` fails the invocation with
/// [`HandlerError::Payload`].
pub fn typed_handler<T, F>(f: F) -> Handler
where
    T: BroadcastTopic + 'static,
    F: Fn(T::Payload, &Envelope) -> HandlerResult + Send + Sync + 'static,
{
    sync_handler(move |env| {
        let payload: T::Payload = env.payload_as()?;
        f(payload, &env)
    })
}

/// Unique id of a subscription, assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Handle identifying one registered handler.
///
/// Dropping the handle does NOT unsubscribe; pass it to
/// [`InMemoryEventBus::unsubscribe`]. Components keep their handles and
/// release them all on destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topic: String,
    id: SubscriptionId,
    owner: Option<String>,
}

impl Subscription {
    pub(crate) fn new(topic: String, id: SubscriptionId, owner: Option<String>) -> Self {
        Self { topic, id, owner }
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Diagnostic owner label (usually a component name).
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

/// Bus-side record of a subscriber.
pub(crate) struct SubscriberSlot {
    pub(crate) id: SubscriptionId,
    pub(crate) owner: Option<String>,
    pub(crate) handler: Handler,
    active: AtomicBool,
}

impl SubscriberSlot {
    pub(crate) fn new(id: SubscriptionId, owner: Option<String>, handler: Handler) -> Self {
        Self {
            id,
            owner,
            handler,
            active: AtomicBool::new(true),
        }
    }

    /// Cleared by unsubscribe. Queued deliveries check it before invoking.
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// A stream of envelopes published on one topic.
///
/// Implements `tokio_stream::Stream`. The underlying subscription is
/// released when the stream is dropped.
pub struct TopicStream {
    inner: UnboundedReceiverStream<Envelope>,
    subscription: Subscription,
    bus: InMemoryEventBus,
}

impl TopicStream {
    pub(crate) fn open(bus: &InMemoryEventBus, topic: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe_as(
            topic,
            Some("topic-stream"),
            sync_handler(move |env| {
                // Receiver gone means the stream is being dropped.
                let _ = tx.send(env);
                Ok(())
            }),
        );
        Self {
            inner: UnboundedReceiverStream::new(rx),
            subscription,
            bus: bus.clone(),
        }
    }
}

impl Stream for TopicStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TopicStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.subscription);
        debug!(topic = %self.subscription.topic, "Topic stream dropped");
    }
}
