//! # Component Lifecycle Integration Tests
//!
//! Components running on one bus, coordinated only through topics:
//!
//! 1. A late joiner converges on state its peers published before it existed
//! 2. A stale late-join snapshot never rolls back a newer broadcast
//! 3. Destroy releases every subscription and UI listener, even when a
//!    detach fails
//! 4. Debounced UI listeners coalesce bursts

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_bus::{sync_handler, BusError, HandlerError};
use shared_types::topics::{senders, GetSelection, SelectionChanged};
use shared_types::{LateJoinReply, SelectionPayload};
use tokio::time::timeout;

use editor_runtime::services::{PreferencesService, SelectionService};
use editor_runtime::{
    Component, ComponentContext, ComponentError, EditorHost, HostElement, LifecycleState,
    RuntimeConfig,
};

// =============================================================================
// TEST FIXTURES
// =============================================================================

/// Keeps a counter in its cache and shares it with late joiners.
struct Counter {
    name: &'static str,
    seed: Option<i64>,
}

#[async_trait]
impl Component for Counter {
    fn name(&self) -> &str {
        self.name
    }

    async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        if let Some(seed) = self.seed {
            ctx.extend_cache([("count", json!(seed))]);
        }
        Ok(())
    }

    fn current_state(&self, ctx: &ComponentContext) -> Option<Value> {
        ctx.cache().get("count").map(|count| json!({ "count": count }))
    }

    fn merge_peer_state(&self, ctx: &ComponentContext, reply: &LateJoinReply) {
        if let Some(count) = reply.state.get("count") {
            ctx.extend_cache([("count", count.clone())]);
        }
    }
}

/// Stateless component that owns a bit of UI and a request topic.
struct Panel {
    toolbar: HostElement,
    dialog: HostElement,
    clicks: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for Panel {
    fn name(&self) -> &str {
        "panel"
    }

    async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let clicks = Arc::clone(&self.clicks);
        ctx.listen(&self.toolbar, "click", move |_| {
            clicks.fetch_add(1, Ordering::SeqCst);
        });
        ctx.listen(&self.dialog, "close", |_| {});
        ctx.subscribe("panel:refresh", sync_handler(|_| Ok(())));
        ctx.respond("panel:ping", |_| async { Ok::<_, HandlerError>(json!("pong")) });
        Ok(())
    }
}

fn host() -> EditorHost {
    EditorHost::new(RuntimeConfig::default())
}

// =============================================================================
// LATE JOIN
// =============================================================================

#[tokio::test]
async fn test_late_joiner_merges_peer_state_via_override() {
    let host = host();
    let a = host.mount(Counter {
        name: "counter-a",
        seed: Some(5),
    });
    a.init().await.unwrap();

    let b = host.mount(Counter {
        name: "counter-b",
        seed: None,
    });
    b.init().await.unwrap();
    timeout(Duration::from_secs(1), host.bus().quiesce())
        .await
        .expect("bus should drain");

    assert_eq!(b.context().cache().get("count"), Some(&json!(5)));
}

#[tokio::test]
async fn test_late_joiner_with_no_peers() {
    let host = host();
    let only = host.mount(Counter {
        name: "lonely",
        seed: None,
    });
    only.init().await.unwrap();
    host.bus().quiesce().await;

    assert_eq!(only.lifecycle(), LifecycleState::Initialized);
    assert!(only.context().cache().get("count").is_none());
}

#[tokio::test]
async fn test_late_joiner_learns_selection_and_preferences() {
    let host = host();
    let selection = host.mount(SelectionService::new());
    selection.init().await.unwrap();
    let preferences = host.mount(PreferencesService::default());
    preferences.init().await.unwrap();

    selection
        .component()
        .select(selection.context(), Some("F3".into()), None)
        .unwrap();
    preferences
        .component()
        .set(preferences.context(), "theme", json!("dark"))
        .unwrap();
    host.bus().quiesce().await;

    // Joins after both broadcasts: only late-join can tell it.
    let late = host.mount(Counter {
        name: "late-panel",
        seed: None,
    });
    late.init().await.unwrap();
    host.bus().quiesce().await;

    let cache = late.context().cache();
    assert_eq!(cache.selected_key().as_deref(), Some("F3"));
    assert_eq!(cache.preferences().get("theme"), Some(&json!("dark")));
}

#[tokio::test]
async fn test_stateless_peers_still_reply() {
    let host = host();
    let replies = Arc::new(Mutex::new(Vec::new()));

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Component for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn merge_peer_state(&self, _ctx: &ComponentContext, reply: &LateJoinReply) {
            self.0.lock().push(reply.sender.clone());
        }
    }

    let panel = host.mount(Panel {
        toolbar: HostElement::new("toolbar"),
        dialog: HostElement::new("dialog"),
        clicks: Arc::new(AtomicUsize::new(0)),
    });
    panel.init().await.unwrap();

    let before = host.bus().events_published();
    let recorder = host.mount(Recorder(Arc::clone(&replies)));
    recorder.init().await.unwrap();
    host.bus().quiesce().await;

    // Announcement plus the panel's reply. The reply carried a null state,
    // which merges as a no-op.
    assert_eq!(host.bus().events_published() - before, 2);
    assert!(replies.lock().is_empty());
}

#[tokio::test]
async fn test_stale_snapshot_does_not_clobber_newer_broadcast() {
    let host = host();
    let late = host.mount(Counter {
        name: "late-panel",
        seed: None,
    });
    late.init().await.unwrap();
    host.bus().quiesce().await;

    // A broadcast the late joiner mirrors directly...
    host.bus()
        .publish_event::<SelectionChanged>(
            Some(senders::SELECTION_SERVICE),
            &SelectionPayload {
                key: Some("F9".into()),
                alias: None,
            },
        )
        .unwrap();
    host.bus().quiesce().await;
    let version = late.context().cache().version("selectedKey");
    assert!(version > 0);

    // ...then an older snapshot arrives on the reply route.
    let mut cache = late.context().cache().clone();
    let stale = LateJoinReply {
        sender: senders::SELECTION_SERVICE.into(),
        state: json!({ "selectedKey": "F1" }),
        as_of: version - 1,
    };
    editor_runtime::late_join::interpret(&mut cache, &stale);
    assert_eq!(cache.selected_key().as_deref(), Some("F9"));
}

// =============================================================================
// TEARDOWN
// =============================================================================

#[tokio::test]
async fn test_destroy_releases_everything() {
    let host = host();
    let toolbar = HostElement::new("toolbar");
    let dialog = HostElement::new("dialog");
    let clicks = Arc::new(AtomicUsize::new(0));
    let panel = host.mount(Panel {
        toolbar: toolbar.clone(),
        dialog: dialog.clone(),
        clicks: Arc::clone(&clicks),
    });
    panel.init().await.unwrap();

    toolbar.emit("click", Value::Null);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert!(host.bus().has_responder("panel:ping"));

    // The dialog vanished first; its detach fails but teardown continues.
    dialog.remove();
    panel.destroy().await;
    host.bus().quiesce().await;

    assert_eq!(host.bus().topic_count(), 0);
    assert!(!host.bus().has_responder("panel:ping"));
    assert_eq!(toolbar.listener_count("click"), 0);
    assert_eq!(panel.context().owned_subscriptions(), 0);
    assert_eq!(panel.context().owned_listeners(), 0);

    toolbar.emit("click", Value::Null);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert!(matches!(
        host.bus().request("panel:ping", Value::Null).await,
        Err(BusError::NoResponder { .. })
    ));
}

#[tokio::test]
async fn test_destroyed_component_sees_no_more_broadcasts() {
    let host = host();
    let selection = host.mount(SelectionService::new());
    selection.init().await.unwrap();
    let panel = host.mount(Counter {
        name: "panel",
        seed: None,
    });
    panel.init().await.unwrap();
    host.bus().quiesce().await;

    panel.destroy().await;
    selection
        .component()
        .select(selection.context(), Some("F5".into()), None)
        .unwrap();
    host.bus().quiesce().await;

    assert_eq!(panel.context().cache().selected_key(), None);
}

// =============================================================================
// REQUESTS & UI
// =============================================================================

#[tokio::test]
async fn test_component_request_to_service() {
    let host = host();
    let selection = host.mount(SelectionService::new());
    selection.init().await.unwrap();
    selection
        .component()
        .select(selection.context(), None, Some("AttackRun".into()))
        .unwrap();

    let panel = host.mount(Counter {
        name: "panel",
        seed: None,
    });
    panel.init().await.unwrap();

    let current = timeout(
        Duration::from_secs(1),
        panel.context().request_typed::<GetSelection>(&()),
    )
    .await
    .expect("request should complete")
    .unwrap();
    assert_eq!(current.alias.as_deref(), Some("AttackRun"));
}

#[tokio::test]
async fn test_debounced_listener_coalesces() {
    struct Search {
        input: HostElement,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Component for Search {
        fn name(&self) -> &str {
            "search"
        }

        async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
            let runs = Arc::clone(&self.runs);
            ctx.listen_debounced(&self.input, "input", Some(Duration::from_millis(20)), move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        }
    }

    let host = host();
    let input = HostElement::new("search-box");
    let runs = Arc::new(AtomicUsize::new(0));
    let search = host.mount(Search {
        input: input.clone(),
        runs: Arc::clone(&runs),
    });
    search.init().await.unwrap();

    for text in ["a", "al", "ali"] {
        input.emit("input", json!(text));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A burst cut short by destroy never fires.
    input.emit("input", json!("alia"));
    search.destroy().await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
