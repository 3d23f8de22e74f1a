use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use shared_bus::{BusError, HandlerError};
use shared_types::topics::{senders, GetPreferences, PreferencesChanged, PreferencesLoaded};
use shared_types::{PreferencePayload, PreferencesPayload};

use crate::component::{Component, ComponentContext};
use crate::error::ComponentError;
use crate::late_join::PreferencesState;

/// Owns the in-memory settings map.
#[derive(Default)]
pub struct PreferencesService {
    settings: Arc<Mutex<Map<String, Value>>>,
}

impl PreferencesService {
    #[must_use]
    pub fn with_settings(settings: Map<String, Value>) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.settings.lock().get(key).cloned()
    }

    /// Replace every setting and broadcast `preferences:loaded`.
    ///
    /// # Errors
    ///
    /// `BusError::Payload` if the settings fail to serialize.
    pub fn load(&self, ctx: &ComponentContext, settings: Map<String, Value>) -> Result<usize, BusError> {
        *self.settings.lock() = settings.clone();
        ctx.publish_event::<PreferencesLoaded>(&PreferencesPayload { settings })
    }

    /// Change one setting and broadcast `preferences:changed`.
    ///
    /// # Errors
    ///
    /// `BusError::Payload` if the value fails to serialize.
    pub fn set(&self, ctx: &ComponentContext, key: &str, value: Value) -> Result<usize, BusError> {
        self.settings.lock().insert(key.to_string(), value.clone());
        ctx.publish_event::<PreferencesChanged>(&PreferencePayload {
            key: key.to_string(),
            value,
        })
    }
}

#[async_trait]
impl Component for PreferencesService {
    fn name(&self) -> &str {
        senders::PREFERENCES_SERVICE
    }

    async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let settings = Arc::clone(&self.settings);
        ctx.respond_typed::<GetPreferences, _, _>(move |()| {
            let settings = settings.lock().clone();
            async move { Ok::<_, HandlerError>(PreferencesPayload { settings }) }
        });
        Ok(())
    }

    fn current_state(&self, _ctx: &ComponentContext) -> Option<Value> {
        let settings = self.settings.lock().clone();
        serde_json::to_value(PreferencesState { settings }).ok()
    }
}
