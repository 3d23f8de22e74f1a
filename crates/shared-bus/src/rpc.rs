//! # Request/Response
//!
//! A `request`/`respond` convention layered on the bus with ephemeral reply
//! topics.
//!
//! ```text
//! requester                      bus                        responder
//!    │ subscribe(reply-topic)     │                              │
//!    │ publish(topic, reply_to) ─▶│── lane[topic] ──────────────▶│ spawn(handler)
//!    │                            │◀── publish(reply-topic) ─────│
//!    │◀── lane[reply-topic] ──────│                              │
//!    │ unsubscribe(reply-topic)   │                              │
//! ```
//!
//! The responder body runs in its own task, off the topic lane, so a slow
//! responder never delays other traffic and a handler can issue requests
//! without deadlocking its own lane.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ReplyTo, RequestTopic};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BusError, HandlerError};
use crate::publisher::InMemoryEventBus;
use crate::subscriber::{sync_handler, Subscription};

/// Wire shape of a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "camelCase")]
enum RpcReply {
    Ok(Value),
    Err(String),
}

/// Per-call options for [`InMemoryEventBus::request_with`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Name stamped on the request and used to derive the reply topic.
    pub requester: Option<String>,
    /// Overrides the bus-wide request deadline.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn from_requester(requester: impl Into<String>) -> Self {
        Self {
            requester: Some(requester.into()),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Handle of a registered responder.
pub struct Responder {
    bus: InMemoryEventBus,
    subscription: Subscription,
}

impl Responder {
    /// Request topic this responder serves.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// The bus subscription backing this responder.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Deregister the responder. Requests already received still reply.
    pub fn detach(self) {
        self.bus.unsubscribe(&self.subscription);
    }
}

/// Unsubscribes the reply topic even if the request future is dropped.
struct ReplyRoute {
    bus: InMemoryEventBus,
    subscription: Subscription,
}

impl Drop for ReplyRoute {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.subscription);
    }
}

type ResponderFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Globally unique reply topic for one request.
fn reply_topic(topic: &str, requester: Option<&str>) -> String {
    format!(
        "{topic}::reply::{}::{}",
        requester.unwrap_or("anonymous"),
        Uuid::new_v4()
    )
}

impl InMemoryEventBus {
    /// Register the responder for `topic`. The last registration wins: an
    /// existing responder is detached with a warning.
    pub fn respond<F, Fut>(&self, topic: &str, handler: F) -> Responder
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.respond_as(topic, None, handler)
    }

    /// [`respond`](Self::respond) with an owner label for diagnostics.
    pub fn respond_as<F, Fut>(&self, topic: &str, owner: Option<&str>, handler: F) -> Responder
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let handler: ResponderFn = Arc::new(move |payload| handler(payload).boxed());
        let weak = self.downgrade();
        let responder_name = owner.map(str::to_string);

        let subscription = self.subscribe_as(
            topic,
            owner,
            sync_handler(move |env| {
                let Some(reply_to) = env.reply_to else {
                    debug!(topic = %env.topic, "Ignoring publish without reply route on request topic");
                    return Ok(());
                };
                let handler = Arc::clone(&handler);
                let weak = weak.clone();
                let sender = responder_name.clone();
                let topic = env.topic;
                let payload = env.payload;

                tokio::spawn(async move {
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                        Ok(fut) => AssertUnwindSafe(fut)
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|p| Err(HandlerError::from_panic(p))),
                        Err(p) => Err(HandlerError::from_panic(p)),
                    };
                    let reply = match outcome {
                        Ok(value) => RpcReply::Ok(value),
                        Err(e) => {
                            warn!(topic = %topic, error = %e, "Responder failed");
                            RpcReply::Err(e.to_string())
                        }
                    };
                    let Some(bus) = InMemoryEventBus::from_weak(&weak) else {
                        return;
                    };
                    match serde_json::to_value(&reply) {
                        Ok(value) => {
                            bus.publish_from(sender.as_deref(), &reply_to.topic, value);
                        }
                        Err(e) => warn!(topic = %topic, error = %e, "Failed to encode reply"),
                    }
                });
                Ok(())
            }),
        );

        let previous = self
            .inner
            .responders
            .lock()
            .insert(topic.to_string(), subscription.id());
        if let Some(previous) = previous {
            warn!(topic = %topic, previous = %previous, "Replacing existing responder");
            self.unsubscribe(&Subscription::new(topic.to_string(), previous, None));
        }

        debug!(topic = %topic, "Responder registered");
        Responder {
            bus: self.clone(),
            subscription,
        }
    }

    /// Typed responder for a well-known request topic.
    pub fn respond_typed<T, F, Fut>(&self, owner: Option<&str>, handler: F) -> Responder
    where
        T: RequestTopic + 'static,
        F: Fn(T::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T::Response, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.respond_as(T::NAME, owner, move |payload| {
            let handler = Arc::clone(&handler);
            async move {
                let request: T::Request = serde_json::from_value(payload)?;
                let response = handler(request).await?;
                Ok::<Value, HandlerError>(serde_json::to_value(response)?)
            }
        })
    }

    /// Returns true if a responder is registered for `topic`.
    #[must_use]
    pub fn has_responder(&self, topic: &str) -> bool {
        self.inner.responders.lock().contains_key(topic)
    }

    /// Issue a request with default options.
    ///
    /// # Errors
    ///
    /// See [`request_with`](Self::request_with).
    pub async fn request(&self, topic: &str, payload: Value) -> Result<Value, BusError> {
        self.request_with(topic, payload, RequestOptions::default())
            .await
    }

    /// Issue a request and wait for its single reply.
    ///
    /// Dropping the returned future cancels the request and releases the
    /// reply topic.
    ///
    /// # Errors
    ///
    /// - `BusError::NoResponder` if no responder is registered right now
    /// - `BusError::HandlerError` if the responder failed
    /// - `BusError::Timeout` if no reply arrives before the deadline
    pub async fn request_with(
        &self,
        topic: &str,
        payload: Value,
        options: RequestOptions,
    ) -> Result<Value, BusError> {
        if !self.has_responder(topic) {
            debug!(topic = %topic, "Request without responder");
            return Err(BusError::NoResponder {
                topic: topic.to_string(),
            });
        }

        let requester = options.requester;
        let deadline = options.timeout.unwrap_or(self.config().request_timeout);
        let reply_topic = reply_topic(topic, requester.as_deref());

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let route = ReplyRoute {
            bus: self.clone(),
            subscription: self.subscribe_as(
                &reply_topic,
                requester.as_deref(),
                sync_handler(move |env| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(env.payload);
                    }
                    Ok(())
                }),
            ),
        };

        self.dispatch(
            topic,
            payload,
            requester.clone(),
            Some(ReplyTo {
                topic: reply_topic,
                requester,
            }),
            None,
        );

        let outcome = tokio::time::timeout(deadline, rx).await;
        drop(route);

        let raw = match outcome {
            Err(_) => {
                warn!(topic = %topic, after = ?deadline, "Request timed out");
                return Err(BusError::Timeout {
                    topic: topic.to_string(),
                    after: deadline,
                });
            }
            Ok(Err(_)) => {
                return Err(BusError::ResponderGone {
                    topic: topic.to_string(),
                })
            }
            Ok(Ok(raw)) => raw,
        };

        match serde_json::from_value::<RpcReply>(raw) {
            Ok(RpcReply::Ok(value)) => Ok(value),
            Ok(RpcReply::Err(message)) => Err(BusError::HandlerError {
                topic: topic.to_string(),
                message,
            }),
            Err(e) => Err(BusError::payload(topic, &e)),
        }
    }

    /// Typed request on a well-known request topic.
    ///
    /// # Errors
    ///
    /// See [`request_with`](Self::request_with); schema mismatches in either
    /// direction are `BusError::Payload`.
    pub async fn request_typed<T: RequestTopic>(
        &self,
        request: &T::Request,
        options: RequestOptions,
    ) -> Result<T::Response, BusError> {
        let payload = serde_json::to_value(request).map_err(|e| BusError::payload(T::NAME, &e))?;
        let value = self.request_with(T::NAME, payload, options).await?;
        serde_json::from_value(value).map_err(|e| BusError::payload(T::NAME, &e))
    }
}
