//! # Runtime Configuration
//!
//! Settings for the bus, UI listeners and logging. Every value has a sane
//! default and can be overridden from the environment.

use std::env;
use std::time::Duration;

use shared_bus::BusConfig;
use thiserror::Error;

/// Default trailing-edge delay for debounced UI listeners.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Event bus configuration.
    pub bus: BusConfig,
    /// Host UI listener configuration.
    pub ui: UiConfig,
    /// Logging configuration.
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiConfig {
    /// Delay used by `listen_debounced` when the caller passes none.
    pub debounce: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `shared_bus=debug,info`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,

    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KB_REQUEST_TIMEOUT_MS`: request deadline (default: 10000)
    /// - `KB_DEBOUNCE_MS`: debounced listener delay (default: 250)
    /// - `KB_LOG_LEVEL` or `RUST_LOG`: log filter (default: info)
    /// - `KB_JSON_LOGS`: JSON log output (default: false)
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let request_timeout = millis_var("KB_REQUEST_TIMEOUT_MS")?
            .unwrap_or(defaults.bus.request_timeout);
        let debounce = millis_var("KB_DEBOUNCE_MS")?.unwrap_or(defaults.ui.debounce);

        let level = env::var("KB_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or(defaults.logging.level);
        let json = env::var("KB_JSON_LOGS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(defaults.logging.json);

        Ok(Self {
            bus: BusConfig { request_timeout },
            ui: UiConfig { debounce },
            logging: LogConfig { level, json },
        })
    }

    /// Reject settings the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// `ConfigError::ZeroRequestTimeout` if every request would time out
    /// immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.request_timeout.is_zero() {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }
}

fn millis_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}
