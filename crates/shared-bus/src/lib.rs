//! # Shared Bus - Event Bus for Inter-Component Communication
//!
//! The process-local publish/subscribe bus every editor component talks
//! through, plus the request/response convention layered on top of it.
//!
//! ## Rules
//!
//! - Components never call each other directly; all coordination goes
//!   through topics on this bus.
//! - Broadcast topics are one-to-many with no reply.
//! - Request topics have at most one responder; replies travel on an
//!   ephemeral per-request topic.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Component A  │                    │ Component B  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │  (lanes)     │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Guarantees
//!
//! - **Per-topic FIFO:** publishes to one topic reach handlers in publish
//!   order, and handlers in subscription order.
//! - **Broadcast isolation:** a failing, panicking or stalled handler never
//!   blocks its siblings; failures are re-published on `bus:diagnostics`.
//! - **Bounded requests:** every `request` has a deadline.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

use std::time::Duration;

pub mod error;
pub mod publisher;
pub mod rpc;
pub mod subscriber;

// Re-export main types
pub use error::{BusError, HandlerError, HandlerFailure};
pub use publisher::{BusConfig, InMemoryEventBus};
pub use rpc::{RequestOptions, Responder};
pub use subscriber::{
    handler_fn, sync_handler, typed_handler, Handler, HandlerFuture, HandlerResult, Subscription,
    SubscriptionId, TopicStream,
};

/// Deadline for requests that do not set their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
