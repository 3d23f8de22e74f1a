//! The component's handle on the outside world.
//!
//! Every subscribe-like helper records its own teardown here, so destroy
//! can release everything without the component keeping books.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use shared_bus::{
    BusError, Handler, HandlerError, HandlerResult, InMemoryEventBus, RequestOptions, Responder,
    Subscription,
};
use shared_types::{BroadcastTopic, Envelope, RequestTopic};
use tracing::{debug, warn};

use super::LifecycleState;
use crate::cache::{self, Cache};
use crate::config::UiConfig;
use crate::ui::{debounce, Detacher, ListenerTarget, UiCallback, UiEvent};

struct UiListener {
    label: String,
    detach: Detacher,
}

#[derive(Default)]
struct OwnedResources {
    subscriptions: Vec<Subscription>,
    responders: Vec<Responder>,
    listeners: Vec<UiListener>,
}

/// What one teardown released.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Teardown {
    pub subscriptions: usize,
    pub listeners: usize,
    pub detach_failures: usize,
}

pub struct ComponentContext {
    name: String,
    bus: InMemoryEventBus,
    cache: Arc<RwLock<Cache>>,
    ui: UiConfig,
    state: Mutex<LifecycleState>,
    owned: Mutex<OwnedResources>,
}

impl ComponentContext {
    pub(crate) fn new(name: String, bus: InMemoryEventBus, ui: UiConfig) -> Self {
        Self {
            name,
            bus,
            cache: Arc::new(RwLock::new(Cache::default())),
            ui,
            state: Mutex::new(LifecycleState::Constructed),
            owned: Mutex::new(OwnedResources::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bus(&self) -> &InMemoryEventBus {
        &self.bus
    }

    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// True between a successful `init()` and `destroy()`.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.lifecycle() == LifecycleState::Initialized
    }

    pub(crate) fn set_lifecycle(&self, state: LifecycleState) {
        *self.state.lock() = state;
    }

    // =========================================================================
    // CACHE
    // =========================================================================

    /// Read access to this component's cache.
    pub fn cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read()
    }

    pub(crate) fn cache_mut(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write()
    }

    /// Shared handle for closures that outlive the borrow of `self`.
    #[must_use]
    pub fn cache_handle(&self) -> Arc<RwLock<Cache>> {
        Arc::clone(&self.cache)
    }

    /// Merge module-specific fields into the cache.
    pub fn extend_cache<I, K>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.cache.write().extend(fields);
    }

    pub(crate) fn install_mirror(&self) {
        let subscriptions = cache::install_mirror(&self.bus, &self.name, &self.cache);
        for subscription in subscriptions {
            self.track(subscription);
        }
    }

    // =========================================================================
    // BUS (tracked)
    // =========================================================================

    fn track(&self, subscription: Subscription) -> Subscription {
        if self.lifecycle() == LifecycleState::Destroyed {
            warn!(
                component = %self.name,
                topic = %subscription.topic(),
                "Subscription after destroy released immediately"
            );
            self.bus.unsubscribe(&subscription);
            return subscription;
        }
        self.owned.lock().subscriptions.push(subscription.clone());
        subscription
    }

    /// Subscribe `handler` to `topic` for the rest of this component's life.
    pub fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        self.track(self.bus.subscribe_as(topic, Some(&self.name), handler))
    }

    /// Typed subscription to a well-known broadcast topic.
    pub fn subscribe_topic<T, F>(&self, f: F) -> Subscription
    where
        T: BroadcastTopic + 'static,
        F: Fn(T::Payload, &Envelope) -> HandlerResult + Send + Sync + 'static,
    {
        self.track(self.bus.subscribe_topic::<T, F>(Some(&self.name), f))
    }

    /// Release one subscription or responder early. Returns `false` if this
    /// component did not own it.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let (owned, responder) = {
            let mut owned = self.owned.lock();
            let before = owned.subscriptions.len();
            owned.subscriptions.retain(|s| s.id() != subscription.id());
            let responder = owned
                .responders
                .iter()
                .position(|r| r.subscription().id() == subscription.id())
                .map(|pos| owned.responders.remove(pos));
            (owned.subscriptions.len() != before, responder)
        };
        if let Some(responder) = responder {
            debug!(component = %self.name, topic = %responder.topic(), "Responder released early");
            responder.detach();
            return true;
        }
        owned && self.bus.unsubscribe(subscription)
    }

    /// Serve `topic` until destroy. Returns the backing subscription.
    pub fn respond<F, Fut>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.track_responder(self.bus.respond_as(topic, Some(&self.name), handler))
    }

    /// Typed responder for a well-known request topic.
    pub fn respond_typed<T, F, Fut>(&self, handler: F) -> Subscription
    where
        T: RequestTopic + 'static,
        F: Fn(T::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T::Response, HandlerError>> + Send + 'static,
    {
        self.track_responder(self.bus.respond_typed::<T, F, Fut>(Some(&self.name), handler))
    }

    fn track_responder(&self, responder: Responder) -> Subscription {
        let subscription = responder.subscription().clone();
        if self.lifecycle() == LifecycleState::Destroyed {
            warn!(component = %self.name, topic = %responder.topic(), "Responder after destroy released immediately");
            responder.detach();
        } else {
            self.owned.lock().responders.push(responder);
        }
        subscription
    }

    /// Broadcast stamped with this component's name.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        self.bus.publish_from(Some(&self.name), topic, payload)
    }

    /// Typed broadcast stamped with this component's name.
    ///
    /// # Errors
    ///
    /// `BusError::Payload` if the payload fails to serialize.
    pub fn publish_event<T: BroadcastTopic>(&self, payload: &T::Payload) -> Result<usize, BusError> {
        self.bus.publish_event::<T>(Some(&self.name), payload)
    }

    /// Broadcast and wait for every handler to settle.
    ///
    /// # Errors
    ///
    /// See [`InMemoryEventBus::publish_and_await`].
    pub async fn publish_and_await(&self, topic: &str, payload: Value) -> Result<(), BusError> {
        self.bus
            .publish_and_await_from(Some(&self.name), topic, payload)
            .await
    }

    /// Request stamped with this component's name.
    ///
    /// # Errors
    ///
    /// See [`InMemoryEventBus::request_with`].
    pub async fn request(&self, topic: &str, payload: Value) -> Result<Value, BusError> {
        self.bus
            .request_with(topic, payload, RequestOptions::from_requester(&self.name))
            .await
    }

    /// [`request`](Self::request) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`InMemoryEventBus::request_with`].
    pub async fn request_with_timeout(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let options = RequestOptions::from_requester(&self.name).with_timeout(timeout);
        self.bus.request_with(topic, payload, options).await
    }

    /// Typed request on a well-known request topic.
    ///
    /// # Errors
    ///
    /// See [`InMemoryEventBus::request_typed`].
    pub async fn request_typed<T: RequestTopic>(
        &self,
        request: &T::Request,
    ) -> Result<T::Response, BusError> {
        self.bus
            .request_typed::<T>(request, RequestOptions::from_requester(&self.name))
            .await
    }

    // =========================================================================
    // HOST UI (tracked)
    // =========================================================================

    /// Attach `callback` to `event` on `target` until destroy.
    pub fn listen<F>(&self, target: &dyn ListenerTarget, event: &str, callback: F)
    where
        F: Fn(&UiEvent) + Send + Sync + 'static,
    {
        let detach = target.add_listener(event, Arc::new(callback));
        self.track_listener(target, event, detach);
    }

    /// Like [`listen`](Self::listen), but `callback` only runs once a burst
    /// of events has been quiet for `delay` (the configured default when
    /// `None`).
    pub fn listen_debounced<F>(
        &self,
        target: &dyn ListenerTarget,
        event: &str,
        delay: Option<Duration>,
        callback: F,
    ) where
        F: Fn(&UiEvent) + Send + Sync + 'static,
    {
        let callback: UiCallback = Arc::new(callback);
        let (debounced, state) = debounce(callback, delay.unwrap_or(self.ui.debounce));
        let detach_listener = target.add_listener(event, debounced);
        let detach: Detacher = Box::new(move || {
            state.cancel();
            detach_listener()
        });
        self.track_listener(target, event, detach);
    }

    fn track_listener(&self, target: &dyn ListenerTarget, event: &str, detach: Detacher) {
        let label = format!("{}#{}", target.target_id(), event);
        if self.lifecycle() == LifecycleState::Destroyed {
            warn!(component = %self.name, listener = %label, "Listener after destroy detached immediately");
            if let Err(e) = detach() {
                warn!(component = %self.name, listener = %label, error = %e, "UI listener detach failed");
            }
            return;
        }
        debug!(component = %self.name, listener = %label, "UI listener attached");
        self.owned.lock().listeners.push(UiListener { label, detach });
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Number of bus subscriptions (including responders) this component
    /// currently owns.
    #[must_use]
    pub fn owned_subscriptions(&self) -> usize {
        let owned = self.owned.lock();
        owned.subscriptions.len() + owned.responders.len()
    }

    #[must_use]
    pub fn owned_listeners(&self) -> usize {
        self.owned.lock().listeners.len()
    }

    /// Release everything: bus subscriptions first, then UI listeners.
    /// Detach failures are logged and do not stop the sweep.
    pub(crate) fn release_all(&self) -> Teardown {
        let OwnedResources {
            subscriptions,
            responders,
            listeners,
        } = std::mem::take(&mut *self.owned.lock());

        let mut teardown = Teardown {
            subscriptions: subscriptions.len() + responders.len(),
            listeners: listeners.len(),
            detach_failures: 0,
        };

        for subscription in &subscriptions {
            self.bus.unsubscribe(subscription);
        }
        for responder in responders {
            responder.detach();
        }
        for UiListener { label, detach } in listeners {
            if let Err(e) = detach() {
                teardown.detach_failures += 1;
                warn!(component = %self.name, listener = %label, error = %e, "UI listener detach failed");
            }
        }
        teardown
    }
}
