//! # Editor Host
//!
//! Owns the bus, the component registry and the configuration, and mounts
//! components onto them. `shutdown()` destroys every mounted component,
//! newest first.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use tracing::info;

use crate::component::{Component, LiveComponent};
use crate::config::RuntimeConfig;
use crate::registry::ComponentRegistry;

#[async_trait]
trait Mounted: Send + Sync {
    async fn destroy(&self);
}

#[async_trait]
impl<C: Component> Mounted for LiveComponent<C> {
    async fn destroy(&self) {
        LiveComponent::destroy(self).await;
    }
}

pub struct EditorHost {
    bus: InMemoryEventBus,
    registry: ComponentRegistry,
    config: RuntimeConfig,
    mounted: Mutex<Vec<Arc<dyn Mounted>>>,
}

impl EditorHost {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            bus: InMemoryEventBus::with_config(config.bus.clone()),
            registry: ComponentRegistry::new(),
            config,
            mounted: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &InMemoryEventBus {
        &self.bus
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Wrap `component` for this host. The caller still calls `init()`.
    pub fn mount<C: Component>(&self, component: C) -> LiveComponent<C> {
        let live = LiveComponent::new(
            component,
            self.bus.clone(),
            self.registry.clone(),
            self.config.ui.clone(),
        );
        self.mounted.lock().push(Arc::new(live.clone()));
        live
    }

    /// Number of components mounted and not yet shut down.
    #[must_use]
    pub fn mounted(&self) -> usize {
        self.mounted.lock().len()
    }

    /// Destroy every mounted component, newest first, then drain the bus.
    pub async fn shutdown(&self) {
        let mounted = std::mem::take(&mut *self.mounted.lock());
        let count = mounted.len();
        for component in mounted.into_iter().rev() {
            component.destroy().await;
        }
        self.bus.quiesce().await;
        info!(components = count, "Host shut down");
    }
}
