//! # Bus Envelope
//!
//! The wrapper every bus delivery travels in.
//!
//! ## Properties
//!
//! - **Logical clock**: `seq` is assigned by the bus at publish time and is
//!   strictly increasing across all topics. Caches use it to discard stale
//!   state (see the late-join merge rules in `editor-runtime`).
//! - **Correlation**: request/response flows carry a `reply_to` topic.
//! - **Sender**: optional component name, used for diagnostics and for the
//!   late-join interpreter. It is informational, not authenticated.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing information for the reply to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTo {
    /// Ephemeral topic the single reply must be published on.
    pub topic: String,
    /// Component that issued the request, if known.
    pub requester: Option<String>,
}

/// A message as delivered to a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Topic the message was published on.
    pub topic: String,

    /// Bus-wide logical clock value of this publish.
    pub seq: u64,

    /// Publishing component, if the publisher identified itself.
    pub sender: Option<String>,

    /// Present only on requests.
    pub reply_to: Option<ReplyTo>,

    /// Untyped payload. Typed access goes through [`Envelope::payload_as`].
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope with no sender and no reply route.
    pub fn new(topic: impl Into<String>, seq: u64, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            seq,
            sender: None,
            reply_to: None,
            payload,
        }
    }

    /// Attach the publishing component's name.
    #[must_use]
    pub fn with_sender(mut self, sender: Option<String>) -> Self {
        self.sender = sender;
        self
    }

    /// Attach a reply route, turning this envelope into a request.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: ReplyTo) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Returns true if a reply is expected.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Deserialize the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
