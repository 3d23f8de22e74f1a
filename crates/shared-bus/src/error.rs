//! # Bus Errors
//!
//! | Error | Raised by | Meaning |
//! |-------|-----------|---------|
//! | [`BusError::NoResponder`] | `request` | nothing registered for the topic at call time |
//! | [`BusError::HandlerError`] | `request` | the responder failed or panicked |
//! | [`BusError::HandlerFailed`] | `publish_and_await` | one or more handlers failed |
//! | [`BusError::Timeout`] | `request` | no reply before the deadline |
//! | [`BusError::ResponderGone`] | `request` | reply route closed without a reply |
//! | [`BusError::Closed`] | `publish_and_await` | the topic lane shut down mid-delivery |
//! | [`BusError::Payload`] | typed helpers | payload does not match the topic schema |

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

use crate::subscriber::SubscriptionId;

/// Failure of a single handler invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler reported a failure.
    #[error("{0}")]
    Failed(String),

    /// Handler panicked; the panic was contained.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Payload did not deserialize into the topic's schema.
    #[error("payload does not match topic schema: {0}")]
    Payload(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub(crate) fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// A handler failure attributed to its subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub owner: Option<String>,
    pub error: HandlerError,
}

/// Errors surfaced to publishers and requesters.
#[derive(Debug, Error, Clone)]
pub enum BusError {
    /// `request` on a topic with no registered responder.
    #[error("no responder registered for request topic '{topic}'")]
    NoResponder { topic: String },

    /// The responder's execution failed.
    #[error("responder for '{topic}' failed: {message}")]
    HandlerError { topic: String, message: String },

    /// At least one handler of an awaited publish failed.
    #[error("{} handler(s) failed on '{}'", .failures.len(), .topic)]
    HandlerFailed {
        topic: String,
        failures: Vec<HandlerFailure>,
    },

    /// No reply before the request deadline.
    #[error("request on '{topic}' timed out after {after:?}")]
    Timeout { topic: String, after: Duration },

    /// The reply route was dropped without a reply.
    #[error("responder for '{topic}' went away before replying")]
    ResponderGone { topic: String },

    /// The topic lane shut down before delivery completed.
    #[error("bus closed while delivering on '{topic}'")]
    Closed { topic: String },

    /// Payload (de)serialization against the topic schema failed.
    #[error("payload error on '{topic}': {message}")]
    Payload { topic: String, message: String },
}

impl BusError {
    /// Topic the error relates to.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::NoResponder { topic }
            | Self::HandlerError { topic, .. }
            | Self::HandlerFailed { topic, .. }
            | Self::Timeout { topic, .. }
            | Self::ResponderGone { topic }
            | Self::Closed { topic }
            | Self::Payload { topic, .. } => topic,
        }
    }

    pub(crate) fn payload(topic: &str, err: &serde_json::Error) -> Self {
        Self::Payload {
            topic: topic.to_string(),
            message: err.to_string(),
        }
    }
}
