//! Component lifecycle errors.

use shared_bus::BusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    /// Another live component already uses this name.
    #[error("component name '{name}' is already in use")]
    NameInUse { name: String },

    /// The component's own `on_init` hook failed.
    #[error("component '{component}' failed to initialize: {message}")]
    Hook { component: String, message: String },

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl ComponentError {
    /// Convenience constructor for hook failures.
    pub fn hook(component: impl Into<String>, message: impl ToString) -> Self {
        Self::Hook {
            component: component.into(),
            message: message.to_string(),
        }
    }
}
