//! # Editor Session Flows
//!
//! Whole-host scenarios: several components sharing one bus and one registry,
//! from mount to shutdown.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};
    use tokio::time::timeout;

    use editor_runtime::services::{PreferencesService, SelectionService};
    use editor_runtime::{
        Component, ComponentContext, ComponentError, EditorHost, HostElement, LifecycleState,
        RuntimeConfig,
    };
    use shared_bus::{handler_fn, sync_handler, HandlerError};
    use shared_types::topics::SelectionChanged;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// A key editor panel: mirrors selection, owns a button and a responder.
    struct KeyEditor {
        name: &'static str,
        save_button: HostElement,
        seen: Arc<Mutex<Vec<Option<String>>>>,
        init_calls: Arc<AtomicUsize>,
        destroy_calls: Arc<AtomicUsize>,
    }

    impl KeyEditor {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                save_button: HostElement::new("save-button"),
                seen: Arc::new(Mutex::new(Vec::new())),
                init_calls: Arc::new(AtomicUsize::new(0)),
                destroy_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Component for KeyEditor {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            let seen = Arc::clone(&self.seen);
            ctx.subscribe_topic::<SelectionChanged, _>(move |selection, _| {
                seen.lock().push(selection.key);
                Ok(())
            });
            ctx.listen(&self.save_button, "click", |_| {});
            ctx.respond(&format!("{}:dirty", self.name), |_| async {
                Ok::<_, HandlerError>(json!(false))
            });
            Ok(())
        }

        async fn on_destroy(&self, _ctx: &ComponentContext) {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_init_and_destroy_are_idempotent() {
        let host = EditorHost::new(RuntimeConfig::default());
        let editor = host.mount(KeyEditor::new("key-editor"));
        let init_calls = Arc::clone(&editor.component().init_calls);
        let destroy_calls = Arc::clone(&editor.component().destroy_calls);

        editor.init().await.unwrap();
        let subscriptions = editor.context().owned_subscriptions();
        editor.init().await.unwrap();
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(editor.context().owned_subscriptions(), subscriptions);

        editor.destroy().await;
        editor.destroy().await;
        assert_eq!(destroy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(editor.lifecycle(), LifecycleState::Destroyed);

        // No resurrection.
        editor.init().await.unwrap();
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(editor.lifecycle(), LifecycleState::Destroyed);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected_until_released() {
        let host = EditorHost::new(RuntimeConfig::default());
        let first = host.mount(KeyEditor::new("key-editor"));
        first.init().await.unwrap();

        let second = host.mount(KeyEditor::new("key-editor"));
        let err = second.init().await.unwrap_err();
        assert!(matches!(err, ComponentError::NameInUse { ref name } if name == "key-editor"));
        assert_eq!(second.lifecycle(), LifecycleState::Constructed);
        assert_eq!(second.context().owned_subscriptions(), 0);

        first.destroy().await;
        second.init().await.unwrap();
        assert!(host.registry().is_live("key-editor"));
    }

    #[tokio::test]
    async fn test_concurrent_init_runs_hook_once() {
        let host = EditorHost::new(RuntimeConfig::default());
        let editor = host.mount(KeyEditor::new("key-editor"));
        let init_calls = Arc::clone(&editor.component().init_calls);

        let (a, b) = tokio::join!(editor.init(), editor.init());
        a.unwrap();
        b.unwrap();
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_bus_and_registry_empty() {
        let host = EditorHost::new(RuntimeConfig::default());
        let selection = host.mount(SelectionService::new());
        selection.init().await.unwrap();
        let preferences = host.mount(PreferencesService::default());
        preferences.init().await.unwrap();
        let editor = host.mount(KeyEditor::new("key-editor"));
        editor.init().await.unwrap();
        let button = editor.component().save_button.clone();
        host.bus().quiesce().await;

        assert_eq!(
            host.registry().live_names(),
            vec!["key-editor", "preferences-service", "selection-service"]
        );
        assert!(button.listener_count("click") > 0);

        timeout(Duration::from_secs(1), host.shutdown())
            .await
            .expect("shutdown should finish");

        assert!(host.registry().is_empty());
        assert_eq!(host.bus().topic_count(), 0);
        assert_eq!(button.listener_count("click"), 0);
        assert!(!host.bus().has_responder("key-editor:dirty"));
        assert_eq!(selection.lifecycle(), LifecycleState::Destroyed);
        assert_eq!(preferences.lifecycle(), LifecycleState::Destroyed);
    }

    // =========================================================================
    // CONVERGENCE
    // =========================================================================

    #[tokio::test]
    async fn test_late_joiner_matches_early_peer() {
        let host = EditorHost::new(RuntimeConfig::default());
        let selection = host.mount(SelectionService::new());
        selection.init().await.unwrap();
        let preferences = host.mount(PreferencesService::default());
        preferences.init().await.unwrap();

        let early = host.mount(KeyEditor::new("early-editor"));
        early.init().await.unwrap();
        host.bus().quiesce().await;

        let mut settings = Map::new();
        settings.insert("theme".into(), json!("dark"));
        preferences
            .component()
            .load(preferences.context(), settings)
            .unwrap();
        selection
            .component()
            .select(selection.context(), Some("F7".into()), Some("Heal".into()))
            .unwrap();
        host.bus().quiesce().await;

        let late = host.mount(KeyEditor::new("late-editor"));
        late.init().await.unwrap();
        host.bus().quiesce().await;

        let early_cache = early.context().cache();
        let late_cache = late.context().cache();
        assert_eq!(late_cache.selected_key(), early_cache.selected_key());
        assert_eq!(late_cache.selected_alias(), early_cache.selected_alias());
        assert_eq!(late_cache.preferences(), early_cache.preferences());
        assert_eq!(late_cache.selected_key().as_deref(), Some("F7"));

        // The late joiner never saw the broadcast itself.
        assert!(late.component().seen.lock().is_empty());
        assert_eq!(*early.component().seen.lock(), vec![Some("F7".to_string())]);
    }

    #[tokio::test]
    async fn test_awaited_publish_settles_before_follow_up() {
        let host = EditorHost::new(RuntimeConfig::default());
        let steps: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        /// Applies an imported profile with some async work per step.
        struct Applier {
            name: &'static str,
            delay: Duration,
            steps: Arc<Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl Component for Applier {
            fn name(&self) -> &str {
                self.name
            }

            async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
                let steps = Arc::clone(&self.steps);
                let name = self.name;
                let delay = self.delay;
                ctx.subscribe(
                    "profile:apply",
                    handler_fn(move |_| {
                        let steps = Arc::clone(&steps);
                        async move {
                            tokio::time::sleep(delay).await;
                            steps.lock().push(format!("{name} applied"));
                            Ok::<(), HandlerError>(())
                        }
                    }),
                );
                Ok(())
            }
        }

        /// Reacts once the profile is fully applied.
        struct Watcher(Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl Component for Watcher {
            fn name(&self) -> &str {
                "watcher"
            }

            async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
                let steps = Arc::clone(&self.0);
                ctx.subscribe(
                    "profile:after-apply",
                    sync_handler(move |_| {
                        steps.lock().push("after-apply seen".to_string());
                        Ok(())
                    }),
                );
                Ok(())
            }
        }

        for (name, delay) in [
            ("keys-applier", 30_u64),
            ("aliases-applier", 5),
            ("bindset-applier", 15),
        ] {
            host.mount(Applier {
                name,
                delay: Duration::from_millis(delay),
                steps: Arc::clone(&steps),
            })
            .init()
            .await
            .unwrap();
        }
        host.mount(Watcher(Arc::clone(&steps))).init().await.unwrap();
        let driver = host.mount(KeyEditor::new("driver"));
        driver.init().await.unwrap();

        timeout(
            Duration::from_secs(1),
            driver.context().publish_and_await("profile:apply", Value::Null),
        )
        .await
        .expect("awaited publish should settle")
        .unwrap();
        assert_eq!(steps.lock().len(), 3);

        driver.context().publish("profile:after-apply", Value::Null);
        timeout(Duration::from_secs(1), host.bus().quiesce())
            .await
            .expect("bus should drain");

        let steps = steps.lock();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[3], "after-apply seen");
        assert!(steps[..3].iter().all(|s| s.ends_with("applied")));
    }
}
