//! # Component Registry
//!
//! Tracks which component names are live. Owned by the host and injected
//! into every component at construction, so separate hosts (and separate
//! tests) never share name state.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │            ComponentRegistry              │
//! │                                           │
//! │  key-panel ──▶ claim #1                   │
//! │  alias-panel ──▶ claim #2                 │
//! │  selection-service ──▶ claim #3           │
//! └───────────────────────────────────────────┘
//!        ▲ init() claims         │ destroy() drops the
//!        │                       ▼ Registration
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ComponentError;

#[derive(Debug)]
struct Claim {
    token: u64,
    since: Instant,
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: RwLock<HashMap<String, Claim>>,
    next_token: AtomicU64,
}

/// Registry of live component names. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    inner: Arc<RegistryInner>,
}

/// Proof that a name is claimed. Dropping it releases the name.
#[derive(Debug)]
pub struct Registration {
    name: String,
    token: u64,
    registry: Weak<RegistryInner>,
}

impl Registration {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut live = inner.live.write();
        let owned = live
            .get(&self.name)
            .filter(|claim| claim.token == self.token)
            .map(|claim| claim.since.elapsed());
        match owned {
            Some(held) => {
                live.remove(&self.name);
                debug!(component = %self.name, held_ms = held.as_millis() as u64, "Name released");
            }
            _ => warn!(component = %self.name, "Released a name this registration no longer owned"),
        }
    }
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for a live component.
    ///
    /// # Errors
    ///
    /// `ComponentError::NameInUse` if another live component holds it.
    pub fn claim(&self, name: &str) -> Result<Registration, ComponentError> {
        let mut live = self.inner.live.write();
        if live.contains_key(name) {
            warn!(component = %name, "Duplicate component name rejected");
            return Err(ComponentError::NameInUse {
                name: name.to_string(),
            });
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        live.insert(
            name.to_string(),
            Claim {
                token,
                since: Instant::now(),
            },
        );
        info!(component = %name, "[Registry] Name claimed");

        Ok(Registration {
            name: name.to_string(),
            token,
            registry: Arc::downgrade(&self.inner),
        })
    }

    #[must_use]
    pub fn is_live(&self, name: &str) -> bool {
        self.inner.live.read().contains_key(name)
    }

    /// Live names, sorted.
    #[must_use]
    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.live.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.live.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
