//! # Editor Runtime Demo Host
//!
//! Boots a bus, mounts the reference services and a status panel that joins
//! late, then walks through a short session:
//!
//! 1. Load configuration from the environment and validate it
//! 2. Install logging
//! 3. Start the selection and preferences services, change some state
//! 4. Start the status panel; it catches up through late-join
//! 5. Query the selection over RPC, type into a debounced filter box
//! 6. Shut everything down

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use shared_types::topics::{BusDiagnostics, GetSelection};
use tracing::{info, warn};

use editor_runtime::logging::init_logging;
use editor_runtime::services::{PreferencesService, SelectionService};
use editor_runtime::{Component, ComponentContext, ComponentError, EditorHost, HostElement, RuntimeConfig};

/// Late-joining panel that reports what it learned.
struct StatusPanel {
    filter_box: HostElement,
    filter: Arc<Mutex<String>>,
}

#[async_trait]
impl Component for StatusPanel {
    fn name(&self) -> &str {
        "status-panel"
    }

    async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        ctx.subscribe_topic::<BusDiagnostics, _>(|diagnostic, _| {
            warn!(topic = %diagnostic.topic, error = %diagnostic.error, "Handler failure reported");
            Ok(())
        });

        let filter = Arc::clone(&self.filter);
        ctx.listen_debounced(&self.filter_box, "input", None, move |event| {
            let text = event.detail.as_str().unwrap_or_default().to_string();
            info!(filter = %text, "Filter applied");
            *filter.lock() = text;
        });
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("reading configuration")?;
    config.validate().context("validating configuration")?;
    init_logging(&config.logging).context("installing logging")?;

    info!("===========================================");
    info!("  Editor Runtime Demo Host");
    info!("===========================================");

    let host = EditorHost::new(config);
    let debounce = host.config().ui.debounce;

    let selection = host.mount(SelectionService::new());
    selection.init().await?;
    let preferences = host.mount(PreferencesService::default());
    preferences.init().await?;

    let mut settings = Map::new();
    settings.insert("theme".into(), json!("dark"));
    settings.insert("autoSave".into(), json!(true));
    preferences
        .component()
        .load(preferences.context(), settings)?;
    selection
        .component()
        .select(selection.context(), Some("F1".into()), None)?;
    host.bus().quiesce().await;

    let panel = host.mount(StatusPanel {
        filter_box: HostElement::new("key-filter"),
        filter: Arc::new(Mutex::new(String::new())),
    });
    panel.init().await?;
    host.bus().quiesce().await;

    {
        let cache = panel.context().cache();
        info!(
            selected_key = ?cache.selected_key(),
            theme = ?cache.preferences().get("theme"),
            "Status panel caught up"
        );
    }

    let current = panel.context().request_typed::<GetSelection>(&()).await?;
    info!(key = ?current.key, "Selection via request");

    for text in ["F", "F1", "F12"] {
        panel.component().filter_box.emit("input", Value::from(text));
    }
    tokio::time::sleep(debounce + Duration::from_millis(50)).await;
    info!(filter = %panel.component().filter.lock(), "Filter after typing burst");

    host.shutdown().await;
    info!(live = host.registry().len(), "Done");
    Ok(())
}
