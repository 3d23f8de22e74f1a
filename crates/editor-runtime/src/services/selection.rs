use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use shared_bus::{BusError, HandlerError};
use shared_types::topics::{senders, GetSelection, SelectionChanged};
use shared_types::SelectionPayload;
use tracing::debug;

use crate::component::{Component, ComponentContext};
use crate::error::ComponentError;
use crate::late_join::SelectionState;

/// Owns the current key/alias selection.
#[derive(Default)]
pub struct SelectionService {
    current: Arc<Mutex<SelectionPayload>>,
}

impl SelectionService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> SelectionPayload {
        self.current.lock().clone()
    }

    /// Change the selection and broadcast it.
    ///
    /// # Errors
    ///
    /// `BusError::Payload` if the selection fails to serialize.
    pub fn select(
        &self,
        ctx: &ComponentContext,
        key: Option<String>,
        alias: Option<String>,
    ) -> Result<usize, BusError> {
        let selection = SelectionPayload { key, alias };
        *self.current.lock() = selection.clone();
        debug!(key = ?selection.key, alias = ?selection.alias, "Selection changed");
        ctx.publish_event::<SelectionChanged>(&selection)
    }
}

#[async_trait]
impl Component for SelectionService {
    fn name(&self) -> &str {
        senders::SELECTION_SERVICE
    }

    async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let current = Arc::clone(&self.current);
        ctx.respond_typed::<GetSelection, _, _>(move |()| {
            let selection = current.lock().clone();
            async move { Ok::<_, HandlerError>(selection) }
        });
        Ok(())
    }

    fn current_state(&self, _ctx: &ComponentContext) -> Option<Value> {
        let current = self.current.lock();
        serde_json::to_value(SelectionState {
            selected_key: current.key.clone(),
            selected_alias: current.alias.clone(),
        })
        .ok()
    }
}
