//! # Host UI Listeners
//!
//! Components attach callbacks to host UI elements through
//! [`ListenerTarget`]. Every attachment yields a [`Detacher`] that the
//! component context keeps and runs on destroy.
//!
//! [`HostElement`] is the in-process implementation used by the demo host
//! and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// A UI event as delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub name: String,
    pub detail: Value,
}

pub type UiCallback = Arc<dyn Fn(&UiEvent) + Send + Sync>;

/// Removes one listener. Runs at most once.
pub type Detacher = Box<dyn FnOnce() -> Result<(), DetachError> + Send>;

/// Failure to remove a listener. Never fatal; teardown logs and continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetachError {
    #[error("target '{target}' no longer exists")]
    TargetGone { target: String },

    #[error("listener for '{event}' on '{target}' was not attached")]
    NotAttached { target: String, event: String },
}

/// Something UI listeners can be attached to.
pub trait ListenerTarget: Send + Sync {
    fn target_id(&self) -> &str;

    /// Attach `callback` to `event` and return the matching detacher.
    fn add_listener(&self, event: &str, callback: UiCallback) -> Detacher;
}

#[derive(Default)]
struct ElementInner {
    listeners: Mutex<HashMap<String, Vec<(u64, UiCallback)>>>,
    next_listener: AtomicU64,
    removed: AtomicBool,
}

/// In-process UI element.
#[derive(Clone)]
pub struct HostElement {
    id: String,
    inner: Arc<ElementInner>,
}

impl HostElement {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: Arc::new(ElementInner::default()),
        }
    }

    /// Invoke every listener for `event`. Returns how many ran.
    pub fn emit(&self, event: &str, detail: Value) -> usize {
        if self.inner.removed.load(Ordering::Acquire) {
            return 0;
        }
        let callbacks: Vec<UiCallback> = self
            .inner
            .listeners
            .lock()
            .get(event)
            .map(|ls| ls.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        let ui_event = UiEvent {
            name: event.to_string(),
            detail,
        };
        for callback in &callbacks {
            callback(&ui_event);
        }
        trace!(target_id = %self.id, event = %event, listeners = callbacks.len(), "UI event emitted");
        callbacks.len()
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Simulate the element leaving the document. Its listeners are gone and
    /// later detach calls fail with [`DetachError::TargetGone`].
    pub fn remove(&self) {
        self.inner.removed.store(true, Ordering::Release);
        self.inner.listeners.lock().clear();
        debug!(target_id = %self.id, "Element removed");
    }
}

impl ListenerTarget for HostElement {
    fn target_id(&self) -> &str {
        &self.id
    }

    fn add_listener(&self, event: &str, callback: UiCallback) -> Detacher {
        let listener = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((listener, callback));

        let weak: Weak<ElementInner> = Arc::downgrade(&self.inner);
        let target = self.id.clone();
        let event = event.to_string();
        Box::new(move || {
            let inner = match weak.upgrade() {
                Some(inner) if !inner.removed.load(Ordering::Acquire) => inner,
                _ => return Err(DetachError::TargetGone { target }),
            };
            let removed = inner.listeners.lock().get_mut(&event).and_then(|list| {
                let pos = list.iter().position(|(id, _)| *id == listener)?;
                Some(list.remove(pos))
            });
            match removed {
                Some(_) => Ok(()),
                None => Err(DetachError::NotAttached { target, event }),
            }
        })
    }
}

/// Shared state of one debounced listener.
#[derive(Debug, Default)]
pub struct DebounceState {
    generation: AtomicU64,
    cancelled: AtomicBool,
}

impl DebounceState {
    /// Drop any pending trailing call.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Trailing-edge debounce: `callback` runs once, `delay` after the last
/// event of a burst, with that last event.
///
/// Outside a tokio runtime the callback runs immediately.
pub fn debounce(callback: UiCallback, delay: Duration) -> (UiCallback, Arc<DebounceState>) {
    let state = Arc::new(DebounceState::default());
    let shared = Arc::clone(&state);

    let wrapped: UiCallback = Arc::new(move |event: &UiEvent| {
        if shared.is_cancelled() {
            return;
        }
        let generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let Ok(handle) = Handle::try_current() else {
            debug!(event = %event.name, "No runtime for debounce; firing immediately");
            callback(event);
            return;
        };

        let state = Arc::clone(&shared);
        let callback = Arc::clone(&callback);
        let event = event.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !state.is_cancelled() && state.generation.load(Ordering::Acquire) == generation {
                callback(&event);
            }
        });
    });

    (wrapped, state)
}
