use std::sync::Arc;

use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use tracing::{debug, info, instrument, warn};

use super::{Component, ComponentContext, LifecycleState};
use crate::config::UiConfig;
use crate::error::ComponentError;
use crate::late_join;
use crate::registry::{ComponentRegistry, Registration};

pub(crate) struct Shared<C> {
    pub(crate) component: C,
    pub(crate) ctx: ComponentContext,
    registry: ComponentRegistry,
    registration: Mutex<Option<Registration>>,
    transition: tokio::sync::Mutex<()>,
}

/// A component plus the runtime state that drives its lifecycle.
///
/// Construction does no bus work; everything happens in [`init`](Self::init).
/// Cheap to clone.
pub struct LiveComponent<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for LiveComponent<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Component> LiveComponent<C> {
    pub fn new(
        component: C,
        bus: InMemoryEventBus,
        registry: ComponentRegistry,
        ui: UiConfig,
    ) -> Self {
        let ctx = ComponentContext::new(component.name().to_string(), bus, ui);
        Self {
            shared: Arc::new(Shared {
                component,
                ctx,
                registry,
                registration: Mutex::new(None),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.ctx.name()
    }

    #[must_use]
    pub fn component(&self) -> &C {
        &self.shared.component
    }

    #[must_use]
    pub fn context(&self) -> &ComponentContext {
        &self.shared.ctx
    }

    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.ctx.lifecycle()
    }

    /// Bring the component up. Idempotent; a no-op after destroy.
    ///
    /// A failing `on_init` rolls back everything acquired so far and leaves
    /// the component `Constructed`.
    ///
    /// # Errors
    ///
    /// - `ComponentError::NameInUse` if another live component has this name
    /// - whatever `on_init` returns
    #[instrument(skip(self), fields(component = %self.name()))]
    pub async fn init(&self) -> Result<(), ComponentError> {
        let _transition = self.shared.transition.lock().await;
        let ctx = &self.shared.ctx;

        match ctx.lifecycle() {
            LifecycleState::Initialized => {
                debug!("Already initialized; init ignored");
                return Ok(());
            }
            LifecycleState::Destroyed => {
                warn!("init after destroy ignored");
                return Ok(());
            }
            LifecycleState::Constructed => {}
        }

        let registration = self.shared.registry.claim(ctx.name())?;

        ctx.cache_mut().seed_defaults();
        late_join::install(&self.shared);
        ctx.install_mirror();
        ctx.set_lifecycle(LifecycleState::Initialized);

        if let Err(e) = self.shared.component.on_init(ctx).await {
            warn!(error = %e, "on_init failed; rolling back");
            ctx.set_lifecycle(LifecycleState::Constructed);
            ctx.release_all();
            return Err(e);
        }

        *self.shared.registration.lock() = Some(registration);
        info!(subscriptions = ctx.owned_subscriptions(), "Component initialized");
        Ok(())
    }

    /// Tear the component down. Safe to call more than once.
    #[instrument(skip(self), fields(component = %self.name()))]
    pub async fn destroy(&self) {
        let _transition = self.shared.transition.lock().await;
        let ctx = &self.shared.ctx;

        match ctx.lifecycle() {
            LifecycleState::Destroyed => {
                warn!("destroy called twice; ignored");
                return;
            }
            LifecycleState::Constructed => {
                debug!("Destroyed before init");
                ctx.set_lifecycle(LifecycleState::Destroyed);
                ctx.release_all();
                return;
            }
            LifecycleState::Initialized => {}
        }

        ctx.set_lifecycle(LifecycleState::Destroyed);
        let teardown = ctx.release_all();
        self.shared.component.on_destroy(ctx).await;
        if let Some(registration) = self.shared.registration.lock().take() {
            debug!(name = %registration.name(), "Name released");
        }

        info!(
            subscriptions = teardown.subscriptions,
            listeners = teardown.listeners,
            detach_failures = teardown.detach_failures,
            "Component destroyed"
        );
    }
}
