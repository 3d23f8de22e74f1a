//! # Components
//!
//! A component is one editor module (a panel, a service, a dialog). The
//! runtime wraps it in a [`LiveComponent`], which drives the lifecycle and
//! owns every resource the component acquires through its
//! [`ComponentContext`].
//!
//! ```text
//! Constructed ──init()──▶ Initialized ──destroy()──▶ Destroyed
//!      │                                                ▲
//!      └──────────────────destroy()─────────────────────┘
//! ```
//!
//! `init()` runs, in order: cache defaults, late-join setup, cache mirror
//! subscriptions, then [`Component::on_init`]. `destroy()` releases every
//! bus subscription, detaches every UI listener, then runs
//! [`Component::on_destroy`].

mod context;
mod lifecycle;

use async_trait::async_trait;
use serde_json::Value;
use shared_types::LateJoinReply;

use crate::error::ComponentError;

pub use context::ComponentContext;
pub use lifecycle::LiveComponent;
pub(crate) use lifecycle::Shared;

/// Lifecycle state of a live component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Constructed,
    Initialized,
    Destroyed,
}

/// Behaviour of one editor module.
///
/// Every hook has a default, so a component only overrides what it needs.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Unique name among live components. Stamped on everything the
    /// component publishes.
    fn name(&self) -> &str;

    /// Module setup: subscriptions, responders, UI listeners.
    async fn on_init(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Module teardown. Owned subscriptions and listeners are already
    /// released when this runs.
    async fn on_destroy(&self, _ctx: &ComponentContext) {}

    /// Snapshot handed to components that join later. `None` replies with a
    /// null state.
    fn current_state(&self, _ctx: &ComponentContext) -> Option<Value> {
        None
    }

    /// Merge a peer's late-join reply. Runs after the built-in interpreter
    /// for well-known senders has updated the cache.
    fn merge_peer_state(&self, _ctx: &ComponentContext, _reply: &LateJoinReply) {}
}
