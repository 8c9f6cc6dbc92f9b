//! End-to-end binding scenarios: a parsed document, a bridge, and a local
//! executor standing in for the browser event loop.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use serde_json::{json, Value};

    use crate::bridge::{Bridge, Invocation};
    use crate::dom::{Document, Element};
    use crate::engine::{Crafter, DispatchOutcome};
    use crate::error::CrafterError;
    use crate::options::CrafterOptions;

    const PROCESSED: &str = "craft-proceed";

    fn double(args: &[Value]) -> Result<Value, String> {
        let n = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .parse::<i64>()
            .map_err(|e| e.to_string())?;
        Ok(Value::String((n * 2).to_string()))
    }

    fn counted_double(calls: &Arc<AtomicUsize>) -> Bridge {
        let calls = Arc::clone(calls);
        Bridge::new().handle_fn("double", move |args| {
            calls.fetch_add(1, Ordering::SeqCst);
            double(args)
        })
    }

    /// Async operation that settles when the returned sender fires.
    fn deferred(bridge: Bridge, name: &str) -> (Bridge, oneshot::Sender<String>) {
        let (tx, rx) = oneshot::channel::<String>();
        let slot = Arc::new(Mutex::new(Some(rx)));
        let bridge = bridge.handle_async(name, move |_args| {
            let rx = slot.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map(Value::String).map_err(|e| e.to_string()),
                    None => Err("invoked twice".to_string()),
                }
            }
        });
        (bridge, tx)
    }

    fn engine(html: &str, bridge: Bridge) -> (LocalPool, Crafter) {
        let pool = LocalPool::new();
        let crafter = Crafter::new(
            Document::parse(html),
            CrafterOptions::default(),
            pool.spawner(),
        );
        crafter.attach(Arc::new(bridge)).unwrap();
        (pool, crafter)
    }

    fn el(crafter: &Crafter, id: &str) -> Element {
        crafter.document().get_element_by_id(id).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SYNCHRONOUS BINDINGS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_sync_binding_end_to_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r##"<p id="seed">21</p>
               <span id="out" craft-name="double" craft-input="#seed" craft-target="this"></span>"##,
            counted_double(&calls),
        );

        let report = crafter.scan().unwrap();
        let out = el(&crafter, "out");
        assert_eq!(out.text_content(), "42");
        assert_eq!(out.attribute(PROCESSED).as_deref(), Some("true"));
        assert_eq!(report.completed, 1);
        assert!(report.is_clean());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r##"<p id="seed">21</p>
               <i id="a" craft-name="double" craft-input="#seed" craft-target="this"></i>
               <i id="b" craft-name="double" craft-input="#a" craft-target="this:[data-x]"></i>"##,
            counted_double(&calls),
        );

        crafter.scan().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(el(&crafter, "b").attribute("data-x").as_deref(), Some("84"));

        let second = crafter.scan().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.completed, 0);
    }

    #[test]
    fn test_already_processed_markup_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r##"<p id="seed">21</p>
               <i id="a" craft-name="double" craft-input="#seed" craft-proceed="true">7</i>"##,
            counted_double(&calls),
        );
        crafter.scan().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(el(&crafter, "a").text_content(), "7");
    }

    #[test]
    fn test_bindings_run_in_document_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let bridge = Bridge::new().handle_fn("log", move |args| {
            log.lock().unwrap().push(args[0].as_str().unwrap_or("").to_string());
            Ok(Value::Null)
        });
        let (_pool, crafter) = engine(
            r##"<section>
                 <i id="e1" data-n="1" craft-name="log" craft-input="#e1:[data-n]"></i>
                 <div><i id="e2" data-n="2" craft-name="log" craft-input="#e2:[data-n]"></i></div>
               </section>
               <i id="e3" data-n="3" craft-name="log" craft-input="#e3:[data-n]"></i>"##,
            bridge,
        );
        crafter.scan().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_injected_bindings_are_discovered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bridge = counted_double(&calls).handle_fn("render", |_| {
            Ok(json!(
                r##"<span id="inner" craft-name="double" craft-input="#seed" craft-target="this"></span>"##
            ))
        });
        let (_pool, crafter) = engine(
            r#"<div id="slot" craft-name="render" craft-target="this"></div>
               <p id="seed">21</p>"#,
            bridge,
        );

        let report = crafter.scan().unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.passes, 3);
        assert_eq!(el(&crafter, "inner").text_content(), "42");
        assert!(el(&crafter, "inner").has_attribute(PROCESSED));
        assert!(el(&crafter, "slot").has_attribute(PROCESSED));
    }

    #[test]
    fn test_result_written_to_other_element() {
        let bridge = Bridge::new().handle_fn("start", |_| Ok(json!({"payload": "agree"})));
        let (_pool, crafter) = engine(
            r##"<body craft-name="start" craft-target="#log:innerText"><pre id="log"></pre></body>"##,
            bridge,
        );
        crafter.scan().unwrap();
        assert_eq!(el(&crafter, "log").text_content(), r#"{"payload":"agree"}"#);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FAILURE CONTAINMENT
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_failures_do_not_stop_the_scan() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r##"<p id="seed">21</p>
               <i id="a" craft-name="missing"></i>
               <i id="b" craft-name="double" craft-input="a:b:c"></i>
               <i id="c" craft-name="double" craft-input="#seed" craft-target="#nowhere"></i>
               <i id="d" craft-name="double" craft-input="#seed" craft-target="this"></i>"##,
            counted_double(&calls),
        );

        let report = crafter.scan().unwrap();
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(
            report.failures[0].error,
            CrafterError::OperationNotFound { .. }
        ));
        assert!(matches!(
            report.failures[1].error,
            CrafterError::AddressSyntax { .. }
        ));
        assert!(matches!(
            report.failures[2].error,
            CrafterError::TargetNotFound { .. }
        ));
        assert_eq!(report.failures[2].element, el(&crafter, "c"));

        // The unresolvable target is detected before the operation runs.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(el(&crafter, "d").text_content(), "42");
        for id in ["a", "b", "c"] {
            assert!(!el(&crafter, id).has_attribute(PROCESSED));
        }
    }

    #[test]
    fn test_missing_inputs_still_invoke() {
        let bridge = Bridge::new().handle_fn("join", |args| {
            let parts: Vec<&str> = args.iter().map(|a| a.as_str().unwrap_or("?")).collect();
            Ok(json!(parts.join("|")))
        });
        let (_pool, crafter) = engine(
            r##"<p id="real">x</p>
               <i id="out" craft-name="join" craft-input="#nope:text,#real" craft-target="this"></i>"##,
            bridge,
        );
        crafter.scan().unwrap();
        assert_eq!(el(&crafter, "out").text_content(), "|x");
    }

    #[test]
    fn test_invocation_error_surfaces_to_dispatch_caller() {
        let bridge = Bridge::new().handle_fn("boom", |_| Err("exploded".to_string()));
        let (_pool, crafter) = engine(r#"<i id="x" craft-name="boom"></i>"#, bridge);

        let outcome = crafter.dispatch(&el(&crafter, "x")).unwrap();
        match outcome {
            DispatchOutcome::Failed(CrafterError::OperationInvocation { operation, message }) => {
                assert_eq!(operation, "boom");
                assert_eq!(message, "exploded");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!el(&crafter, "x").has_attribute(PROCESSED));
    }

    #[test]
    fn test_failed_binding_retried_by_next_scan() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let bridge = Bridge::new().handle_fn("flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first call fails".to_string())
            } else {
                Ok(json!("ok"))
            }
        });
        let (_pool, crafter) = engine(r#"<i id="x" craft-name="flaky" craft-target="this"></i>"#, bridge);

        assert_eq!(crafter.scan().unwrap().failures.len(), 1);
        assert!(crafter.scan().unwrap().is_clean());
        assert_eq!(el(&crafter, "x").text_content(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_bridge_not_ready() {
        let pool = LocalPool::new();
        let crafter = Crafter::new(
            Document::parse(r#"<i id="x" craft-name="double"></i>"#),
            CrafterOptions::default(),
            pool.spawner(),
        );
        assert!(!crafter.is_ready());
        assert!(matches!(crafter.scan(), Err(CrafterError::BridgeNotReady)));
        assert!(matches!(
            crafter.dispatch(&el(&crafter, "x")),
            Err(CrafterError::BridgeNotReady)
        ));
        assert!(matches!(
            crafter.call("double", vec![]),
            Err(CrafterError::BridgeNotReady)
        ));
        assert!(!el(&crafter, "x").has_attribute(PROCESSED));
    }

    #[test]
    fn test_init_called_once_on_attach() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&inits);
        let bridge = Arc::new(Bridge::new().handle_fn("init", move |args| {
            assert!(args.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }));

        let pool = LocalPool::new();
        let crafter = Crafter::new(Document::parse(""), CrafterOptions::default(), pool.spawner());
        crafter.attach(Arc::clone(&bridge)).unwrap();
        assert!(crafter.is_ready());
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        assert!(matches!(
            crafter.attach(bridge),
            Err(CrafterError::AlreadyAttached)
        ));
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_without_init() {
        let (_pool, crafter) = engine("<p></p>", Bridge::new());
        assert!(crafter.is_ready());
    }

    #[test]
    fn test_direct_call() {
        let (_pool, crafter) = engine("", Bridge::new().handle_fn("double", double));
        match crafter.call("double", vec![json!("4")]).unwrap() {
            Invocation::Ready(value) => assert_eq!(value, json!("8")),
            Invocation::Pending(_) => panic!("double is synchronous"),
        }
        assert!(matches!(
            crafter.call("triple", vec![]),
            Err(CrafterError::OperationNotFound { .. })
        ));
    }

    #[test]
    fn test_custom_attribute_prefix() {
        let pool = LocalPool::new();
        let crafter = Crafter::new(
            Document::parse(r##"<p id="seed">5</p><i id="x" wasm-name="double" wasm-input="#seed" wasm-target="this"></i>"##),
            CrafterOptions::with_prefix("wasm"),
            pool.spawner(),
        );
        crafter
            .attach(Arc::new(Bridge::new().handle_fn("double", double)))
            .unwrap();
        crafter.scan().unwrap();
        assert_eq!(el(&crafter, "x").text_content(), "10");
        assert!(el(&crafter, "x").has_attribute("wasm-proceed"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ASYNCHRONOUS BINDINGS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_async_binding_end_to_end() {
        let (bridge, tx) = deferred(Bridge::new(), "fetch");
        let (mut pool, crafter) = engine(
            r#"<span id="out" craft-name="fetch" craft-target="this" craft-async>…</span>"#,
            bridge,
        );

        let report = crafter.scan().unwrap();
        assert_eq!(report.pending, 1);
        assert_eq!(crafter.in_flight(), 1);

        pool.run_until_stalled();
        let out = el(&crafter, "out");
        assert_eq!(out.text_content(), "…");
        assert!(!out.has_attribute(PROCESSED));

        // A re-scan while in flight must not invoke the operation a second time.
        assert_eq!(crafter.scan().unwrap().pending, 0);

        tx.send("42".to_string()).unwrap();
        pool.run_until_stalled();
        assert_eq!(out.text_content(), "42");
        assert!(out.has_attribute(PROCESSED));
        assert_eq!(crafter.in_flight(), 0);
    }

    #[test]
    fn test_async_bindings_settle_out_of_order() {
        let (bridge, first_tx) = deferred(Bridge::new(), "first");
        let (bridge, second_tx) = deferred(bridge, "second");
        let (mut pool, crafter) = engine(
            r#"<i id="a" craft-name="first" craft-target="this" craft-async></i>
               <i id="b" craft-name="second" craft-target="this" craft-async></i>"#,
            bridge,
        );

        assert_eq!(crafter.scan().unwrap().pending, 2);

        second_tx.send("B".to_string()).unwrap();
        pool.run_until_stalled();
        assert_eq!(el(&crafter, "b").text_content(), "B");
        assert!(!el(&crafter, "a").has_attribute(PROCESSED));

        first_tx.send("A".to_string()).unwrap();
        pool.run_until_stalled();
        assert_eq!(el(&crafter, "a").text_content(), "A");
        assert!(el(&crafter, "a").has_attribute(PROCESSED));
    }

    #[test]
    fn test_async_settlement_reindexes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (bridge, tx) = deferred(counted_double(&calls), "fetch");
        let (mut pool, crafter) = engine(
            r#"<div id="slot" craft-name="fetch" craft-target="this" craft-async></div>
               <p id="seed">21</p>"#,
            bridge,
        );
        crafter.scan().unwrap();

        tx.send(r##"<b id="inner" craft-name="double" craft-input="#seed" craft-target="this"></b>"##.to_string())
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(el(&crafter, "inner").text_content(), "42");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_async_rejection_leaves_element_unprocessed() {
        let bridge =
            Bridge::new().handle_async("fetch", |_| async { Err::<Value, _>("offline".to_string()) });
        let (mut pool, crafter) = engine(
            r#"<i id="x" craft-name="fetch" craft-target="this" craft-async>old</i>"#,
            bridge,
        );
        crafter.scan().unwrap();
        pool.run_until_stalled();

        let x = el(&crafter, "x");
        assert_eq!(x.text_content(), "old");
        assert!(!x.has_attribute(PROCESSED));
        assert_eq!(crafter.in_flight(), 0);
    }

    #[test]
    fn test_async_flag_on_sync_operation() {
        let (mut pool, crafter) = engine(
            r##"<p id="seed">21</p><i id="x" craft-name="double" craft-input="#seed" craft-target="this" craft-async></i>"##,
            Bridge::new().handle_fn("double", double),
        );
        assert_eq!(crafter.scan().unwrap().pending, 1);
        assert!(!el(&crafter, "x").has_attribute(PROCESSED));

        pool.run_until_stalled();
        assert_eq!(el(&crafter, "x").text_content(), "42");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // EVENT TRIGGERS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn counter_bridge(calls: &Arc<AtomicUsize>) -> Bridge {
        let calls = Arc::clone(calls);
        Bridge::new().handle_fn("inc", move |_| {
            Ok(json!(calls.fetch_add(1, Ordering::SeqCst) + 1))
        })
    }

    #[test]
    fn test_event_trigger_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r#"<button id="b" craft-name="inc" craft-trigger="click" craft-target="this">0</button>"#,
            counter_bridge(&calls),
        );

        let report = crafter.scan().unwrap();
        assert_eq!(report.armed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Re-indexing an armed element keeps a single listener.
        assert_eq!(crafter.scan().unwrap().armed, 0);
        let button = el(&crafter, "b");
        assert_eq!(crafter.document().listener_count(&button, "click"), 1);

        assert_eq!(crafter.document().dispatch_event(&button, "click"), 1);
        assert_eq!(button.text_content(), "1");
        assert!(button.has_attribute(PROCESSED));

        crafter.document().dispatch_event(&button, "click");
        crafter.scan().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(crafter.document().listener_count(&button, "click"), 1);
    }

    #[test]
    fn test_self_rerendering_trigger_keeps_one_listener() {
        const BUTTON: &str =
            r##"<button id="b" craft-name="render" craft-trigger="click" craft-target="#slot"></button>"##;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let bridge = Bridge::new().handle_fn("render", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!(BUTTON))
        });
        let (_pool, crafter) = engine(&format!(r#"<div id="slot">{}</div>"#, BUTTON), bridge);
        crafter.scan().unwrap();

        for _ in 0..50 {
            let button = el(&crafter, "b");
            assert_eq!(crafter.document().dispatch_event(&button, "click"), 1);
            assert!(!crafter.document().is_connected(&button));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 50);
        assert_eq!(crafter.document().total_listeners(), 1);
        assert_eq!(crafter.document().elements_with_attribute("craft-name").len(), 1);
    }

    #[test]
    fn test_async_trigger_fires_once_until_settled() {
        let (bridge, tx) = deferred(Bridge::new(), "fetch");
        let (mut pool, crafter) = engine(
            r#"<button id="b" craft-name="fetch" craft-trigger="click" craft-target="this" craft-async>x</button>"#,
            bridge,
        );
        assert_eq!(crafter.scan().unwrap().armed, 1);

        let button = el(&crafter, "b");
        crafter.document().dispatch_event(&button, "click");
        crafter.document().dispatch_event(&button, "click");
        pool.run_until_stalled();
        assert_eq!(button.text_content(), "x");
        assert!(!button.has_attribute(PROCESSED));
        assert_eq!(crafter.in_flight(), 1);

        tx.send("done".to_string()).unwrap();
        pool.run_until_stalled();
        assert_eq!(button.text_content(), "done");
        assert!(button.has_attribute(PROCESSED));
        assert_eq!(crafter.in_flight(), 0);
    }

    #[test]
    fn test_unknown_event_never_fires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r#"<button id="b" craft-name="inc" craft-trigger="teleport">0</button>"#,
            counter_bridge(&calls),
        );
        crafter.scan().unwrap();
        crafter.document().dispatch_event(&el(&crafter, "b"), "click");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_failure_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_pool, crafter) = engine(
            r##"<button id="b" craft-name="inc" craft-trigger="click" craft-target="#gone">0</button>"##,
            counter_bridge(&calls),
        );
        crafter.scan().unwrap();

        let button = el(&crafter, "b");
        crafter.document().dispatch_event(&button, "click");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!button.has_attribute(PROCESSED));
    }

    #[test]
    fn test_trigger_reads_inputs_at_fire_time() {
        let (_pool, crafter) = engine(
            r##"<input id="n" value="1">
               <button id="b" craft-name="double" craft-input="#n:value" craft-trigger="click" craft-target="#out"></button>
               <p id="out"></p>"##,
            Bridge::new().handle_fn("double", double),
        );
        crafter.scan().unwrap();

        let input = el(&crafter, "n");
        crafter.document().set_property(&input, "value", "8");
        crafter.document().dispatch_event(&el(&crafter, "b"), "click");
        assert_eq!(el(&crafter, "out").text_content(), "16");
    }

    #[test]
    fn test_trigger_with_missing_operation_is_not_armed() {
        let (_pool, crafter) = engine(
            r#"<button id="b" craft-name="nope" craft-trigger="click"></button>"#,
            Bridge::new(),
        );
        let report = crafter.scan().unwrap();
        assert_eq!(report.armed, 0);
        assert!(matches!(
            report.failures[0].error,
            CrafterError::OperationNotFound { .. }
        ));
        assert_eq!(
            crafter.document().listener_count(&el(&crafter, "b"), "click"),
            0
        );
    }
}
