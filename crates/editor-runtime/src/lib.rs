//! # Editor Runtime Library
//!
//! Component lifecycle, per-component caches and the late-join protocol on
//! top of `shared-bus`. The demo host is the `main.rs` binary.
//!
//! ## Modules
//!
//! - `component/` - `Component` trait, `ComponentContext`, `LiveComponent`
//! - `cache/` - versioned component cache and the broadcast mirror table
//! - `late_join` - snapshot exchange for components that start late
//! - `registry/` - live component names, injected per host
//! - `ui` - host UI listener seam and debouncing
//! - `services/` - reference owners of selection and preferences
//! - `host` - mounts components onto one bus and shuts them down

#![allow(clippy::type_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cache;
pub mod component;
pub mod config;
pub mod error;
pub mod host;
pub mod late_join;
pub mod logging;
pub mod registry;
pub mod services;
pub mod ui;

pub use cache::Cache;
pub use component::{Component, ComponentContext, LifecycleState, LiveComponent};
pub use config::{ConfigError, LogConfig, RuntimeConfig, UiConfig};
pub use error::ComponentError;
pub use host::EditorHost;
pub use registry::{ComponentRegistry, Registration};
pub use ui::{DetachError, HostElement, ListenerTarget, UiEvent};
