//! # Bus Properties Seen From Components
//!
//! Ordering, isolation and request/response behaviour when the traffic comes
//! from real components rather than raw bus calls.
//!
//! 1. **Per-topic FIFO**: one component's publishes arrive in order
//! 2. **Isolation**: a failing or stuck component handler never starves its
//!    siblings
//! 3. **Awaited publish**: `publish_and_await` returns after every handler
//! 4. **Requests**: echo round trip, no responder, deadline

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use editor_runtime::{Component, ComponentContext, ComponentError, EditorHost, RuntimeConfig};
    use shared_bus::{handler_fn, sync_handler, BusError, HandlerError};
    use shared_types::topics::BusDiagnostics;
    use shared_types::BusDiagnostic;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Records every payload on `topic`, optionally failing on a marker value.
    struct Listener {
        name: &'static str,
        topic: &'static str,
        log: Arc<Mutex<Vec<Value>>>,
        fail_on: Option<Value>,
    }

    #[async_trait]
    impl Component for Listener {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
            let log = Arc::clone(&self.log);
            let fail_on = self.fail_on.clone();
            ctx.subscribe(
                self.topic,
                sync_handler(move |env| {
                    if fail_on.as_ref() == Some(&env.payload) {
                        return Err(HandlerError::msg("refusing marker payload"));
                    }
                    log.lock().push(env.payload);
                    Ok(())
                }),
            );
            Ok(())
        }
    }

    /// Component with no subscriptions, used as a publisher/requester.
    struct Driver;

    #[async_trait]
    impl Component for Driver {
        fn name(&self) -> &str {
            "driver"
        }
    }

    fn listener(
        name: &'static str,
        topic: &'static str,
        fail_on: Option<Value>,
    ) -> (Listener, Arc<Mutex<Vec<Value>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Listener {
                name,
                topic,
                log: Arc::clone(&log),
                fail_on,
            },
            log,
        )
    }

    fn host_with_timeout(ms: u64) -> EditorHost {
        let mut config = RuntimeConfig::default();
        config.bus.request_timeout = Duration::from_millis(ms);
        EditorHost::new(config)
    }

    // =========================================================================
    // ORDERING & ISOLATION
    // =========================================================================

    #[tokio::test]
    async fn test_publishes_arrive_in_order() {
        let host = EditorHost::new(RuntimeConfig::default());
        let (component, log) = listener("key-panel", "keys:edited", None);
        host.mount(component).init().await.unwrap();
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        for i in 0..50 {
            driver.context().publish("keys:edited", json!(i));
        }
        timeout(Duration::from_secs(1), host.bus().quiesce())
            .await
            .expect("bus should drain");

        let expected: Vec<Value> = (0..50).map(|i| json!(i)).collect();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn test_failing_component_does_not_block_siblings() {
        let host = EditorHost::new(RuntimeConfig::default());
        let (fragile, fragile_log) = listener("fragile", "keys:edited", Some(json!("boom")));
        let (steady, steady_log) = listener("steady", "keys:edited", None);
        host.mount(fragile).init().await.unwrap();
        host.mount(steady).init().await.unwrap();

        let diagnostics: Arc<Mutex<Vec<BusDiagnostic>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&diagnostics);
        host.bus().subscribe_topic::<BusDiagnostics, _>(None, move |d, _| {
            sink.lock().push(d);
            Ok(())
        });

        let driver = host.mount(Driver);
        driver.init().await.unwrap();
        for payload in [json!("a"), json!("boom"), json!("b")] {
            driver.context().publish("keys:edited", payload);
        }
        host.bus().quiesce().await;

        assert_eq!(*steady_log.lock(), vec![json!("a"), json!("boom"), json!("b")]);
        assert_eq!(*fragile_log.lock(), vec![json!("a"), json!("b")]);

        let diagnostics = diagnostics.lock();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].owner.as_deref(), Some("fragile"));
        assert_eq!(diagnostics[0].topic, "keys:edited");
    }

    #[tokio::test]
    async fn test_stuck_component_does_not_stall_siblings() {
        /// Awaits a parser that never answers before handling an edit.
        struct Validator;

        #[async_trait]
        impl Component for Validator {
            fn name(&self) -> &str {
                "validator"
            }

            async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
                ctx.subscribe(
                    "keys:edited",
                    handler_fn(|_| async {
                        future::pending::<()>().await;
                        Ok::<(), HandlerError>(())
                    }),
                );
                Ok(())
            }
        }

        let host = EditorHost::new(RuntimeConfig::default());
        host.mount(Validator).init().await.unwrap();
        let (steady, steady_log) = listener("steady", "keys:edited", None);
        host.mount(steady).init().await.unwrap();
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        for i in 0..3 {
            driver.context().publish("keys:edited", json!(i));
        }
        timeout(Duration::from_secs(1), async {
            while steady_log.lock().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sibling should keep receiving edits");

        assert_eq!(*steady_log.lock(), vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_publish_and_await_waits_for_every_handler() {
        let host = EditorHost::new(RuntimeConfig::default());
        let applied = Arc::new(AtomicUsize::new(0));
        for delay in [25_u64, 0, 10] {
            let applied = Arc::clone(&applied);
            host.bus().subscribe(
                "profile:apply",
                handler_fn(move |_| {
                    let applied = Arc::clone(&applied);
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        applied.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
        }
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        timeout(
            Duration::from_secs(1),
            driver.context().publish_and_await("profile:apply", json!({})),
        )
        .await
        .expect("awaited publish should settle")
        .unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 3);
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    #[tokio::test]
    async fn test_echo_between_components() {
        struct Echo;

        #[async_trait]
        impl Component for Echo {
            fn name(&self) -> &str {
                "echo-service"
            }

            async fn on_init(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
                ctx.respond("echo", |payload| async move { Ok::<_, HandlerError>(payload) });
                Ok(())
            }
        }

        let host = EditorHost::new(RuntimeConfig::default());
        host.mount(Echo).init().await.unwrap();
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        let reply = driver
            .context()
            .request("echo", json!({ "command": "FireAll" }))
            .await
            .unwrap();
        assert_eq!(reply, json!({ "command": "FireAll" }));
    }

    #[tokio::test]
    async fn test_request_without_responder_fails_fast() {
        let host = EditorHost::new(RuntimeConfig::default());
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        let result = timeout(
            Duration::from_millis(100),
            driver.context().request("parser:validate", json!("+FireAll")),
        )
        .await
        .expect("must not wait for a reply");
        assert!(matches!(result, Err(BusError::NoResponder { ref topic }) if topic == "parser:validate"));
    }

    #[tokio::test]
    async fn test_hanging_responder_hits_configured_deadline() {
        let host = host_with_timeout(30);
        let _stuck = host.bus().respond("parser:validate", |_| future::pending());
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        let result = timeout(
            Duration::from_secs(1),
            driver.context().request("parser:validate", json!("+FireAll")),
        )
        .await
        .expect("deadline should fire first");
        match result {
            Err(BusError::Timeout { topic, after }) => {
                assert_eq!(topic, "parser:validate");
                assert_eq!(after, Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_per_call_deadline_overrides_default() {
        let host = host_with_timeout(5_000);
        let _stuck = host.bus().respond("parser:validate", |_| future::pending());
        let driver = host.mount(Driver);
        driver.init().await.unwrap();

        let result = driver
            .context()
            .request_with_timeout("parser:validate", Value::Null, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(BusError::Timeout { .. })));
    }
}
