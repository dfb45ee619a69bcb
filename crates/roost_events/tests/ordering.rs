//! Ordering behaviour of hooks: explicit references, tags and caching.

use std::sync::Arc;

use parking_lot::Mutex;
use roost_events::prelude::*;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(log: &Log, name: &'static str) -> Handler {
    let log = Arc::clone(log);
    Handler::new(name, move |_| {
        log.lock().push(name);
        Ok(())
    })
}

fn position(log: &[&str], name: &str) -> usize {
    log.iter()
        .position(|n| *n == name)
        .unwrap_or_else(|| panic!("{name} was not called"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Explicit references
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn before_and_after_are_respected_transitively() {
    let hook = Hook::new("chain");
    let log: Log = Arc::default();

    let c = recorder(&log, "m.c");
    let a = recorder(&log, "m.a");
    let b = recorder(&log, "m.b");
    let d = recorder(&log, "m.d");

    hook.register(&c, RegisterOptions::new().after("b")).unwrap();
    hook.register(&d, RegisterOptions::new()).unwrap();
    hook.register(&a, RegisterOptions::new().before(&b)).unwrap();
    hook.register(&b, RegisterOptions::new().before(&d)).unwrap();

    hook.fire().unwrap();
    let log = log.lock();
    assert_eq!(log.len(), 4);
    assert!(position(&log, "m.a") < position(&log, "m.b"));
    assert!(position(&log, "m.b") < position(&log, "m.c"));
    assert!(position(&log, "m.b") < position(&log, "m.d"));
}

#[test]
fn tuple_of_mixed_references() {
    let hook = Hook::new("mixed");
    let log: Log = Arc::default();

    let first = recorder(&log, "pkg.first");
    let second = recorder(&log, "pkg.second");
    let third = recorder(&log, "pkg.third");
    let last = recorder(&log, "pkg.last");

    hook.register(&last, RegisterOptions::new().after(("first", &second, ":group")))
        .unwrap();
    hook.register(&first, RegisterOptions::new()).unwrap();
    hook.register(&second, RegisterOptions::new()).unwrap();
    hook.register(&third, RegisterOptions::tagged("group")).unwrap();

    hook.fire().unwrap();
    assert_eq!(log.lock().last(), Some(&"pkg.last"));
}

#[test]
fn cycle_fails_and_cache_recovers() {
    let hook = Hook::new("cyclic");
    let log: Log = Arc::default();
    let a = recorder(&log, "x.a");
    let b = recorder(&log, "x.b");
    let c = recorder(&log, "x.c");

    hook.register(&a, RegisterOptions::new().after(&c)).unwrap();
    hook.register(&b, RegisterOptions::new().after(&a)).unwrap();
    hook.register(&c, RegisterOptions::new().after(&b)).unwrap();

    let err = hook.fire().unwrap_err();
    assert!(matches!(err, HookError::CyclicDependency { ref nodes, .. } if nodes.len() == 3));
    assert!(hook.is_dirty());

    hook.unregister(&c).unwrap();
    hook.register(&c, RegisterOptions::new()).unwrap();
    hook.fire().unwrap();
    assert_eq!(*log.lock(), vec!["x.c", "x.a", "x.b"]);
}

#[test]
fn missing_dependency_names_the_requester() {
    let hook = Hook::new("missing");
    hook.register(
        &Handler::new("plugin.handler", |_| Ok(())),
        RegisterOptions::new().after("nothing.here"),
    )
    .unwrap();

    match hook.fire() {
        Err(HookError::DependencyMissing {
            hook,
            dependency,
            node,
        }) => {
            assert_eq!(hook, "missing");
            assert_eq!(dependency, "nothing.here");
            assert_eq!(node, "plugin.handler");
        }
        other => panic!("expected a missing dependency, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn default_tags_run_in_declared_order() {
    let hook = Hook::with_config(
        "phases",
        HookConfig::new().with_default_tags(["early", "normal", "late"]),
    );
    let log: Log = Arc::default();

    let late_log = Arc::clone(&log);
    let late = Handler::new("t.late", move |event| {
        assert_eq!(event.get_bool("early_ran"), Some(true));
        assert_eq!(event.get_bool("normal_ran"), Some(true));
        event.insert("late_ran", true);
        late_log.lock().push("late");
        Ok(())
    });
    let normal_log = Arc::clone(&log);
    let normal = Handler::new("t.normal", move |event| {
        event.insert("normal_ran", true);
        normal_log.lock().push("normal");
        Ok(())
    });
    let early_log = Arc::clone(&log);
    let early = Handler::new("t.early", move |event| {
        event.insert("early_ran", true);
        early_log.lock().push("early");
        Ok(())
    });

    hook.register(&late, RegisterOptions::tagged("late")).unwrap();
    hook.register(&normal, RegisterOptions::tagged("normal")).unwrap();
    hook.register(&early, RegisterOptions::tagged("early")).unwrap();

    let event = hook.fire().unwrap();
    assert_eq!(event.get_bool("late_ran"), Some(true));
    assert_eq!(*log.lock(), vec!["early", "normal", "late"]);
}

#[test]
fn default_tags_survive_their_members() {
    let hook = Hook::with_config("phases", HookConfig::new().with_default_tags(["a", "b"]));
    let handler = Handler::anonymous(|_| Ok(()));
    hook.register(&handler, RegisterOptions::tagged("b")).unwrap();
    hook.unregister(&handler).unwrap();
    assert!(hook.has_tag("a"));
    assert!(hook.has_tag("b"));
}

#[test]
fn declared_tag_orders_its_members() {
    let hook = Hook::new("declared");
    let log: Log = Arc::default();
    let setup = recorder(&log, "app.setup");
    let member = recorder(&log, "app.member");

    hook.register(&member, RegisterOptions::tagged("plugins")).unwrap();
    hook.register(&setup, RegisterOptions::new()).unwrap();
    hook.declare_tag("plugins", (), &setup);

    hook.fire().unwrap();
    assert_eq!(*log.lock(), vec!["app.setup", "app.member"]);

    hook.unregister(&member).unwrap();
    assert!(hook.has_tag("plugins"));
}

#[test]
fn tag_reference_orders_before_a_tag() {
    let hook = Hook::new("tag_ref");
    let log: Log = Arc::default();
    let member = recorder(&log, "m.member");
    let first = recorder(&log, "m.first");

    let output = hook.tag("output");
    hook.register(&member, RegisterOptions::tagged("output")).unwrap();
    hook.register(&first, RegisterOptions::new().before(output)).unwrap();

    hook.fire().unwrap();
    assert_eq!(*log.lock(), vec!["m.first", "m.member"]);
}

#[test]
fn tag_can_only_be_named_with_colon_when_handler_shares_name() {
    let hook = Hook::new("shadow");
    let log: Log = Arc::default();

    let shadowing = recorder(&log, "late");
    let tagged = recorder(&log, "x.tagged");
    let user = recorder(&log, "x.user");

    hook.register(&tagged, RegisterOptions::tagged("late")).unwrap();
    hook.register(&user, RegisterOptions::new().after(":late")).unwrap();
    hook.register(&shadowing, RegisterOptions::new().after(&user)).unwrap();

    hook.fire().unwrap();
    let log = log.lock();
    assert!(position(&log, "x.tagged") < position(&log, "x.user"));
    assert!(position(&log, "x.user") < position(&log, "late"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Caching and events
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn repeated_fires_reuse_order_with_fresh_events() {
    let hook = Hook::new("idempotent");
    let log: Log = Arc::default();
    for name in ["o.one", "o.two", "o.three"] {
        hook.register(&recorder(&log, name), RegisterOptions::new())
            .unwrap();
    }
    let mutate = Handler::new("o.mutate", |event| {
        assert!(!event.contains("seen"));
        event.insert("seen", true);
        Ok(())
    });
    hook.register(&mutate, RegisterOptions::new()).unwrap();

    let first = hook.fire().unwrap();
    let first_order = log.lock().clone();
    assert!(!hook.is_dirty());
    log.lock().clear();

    let second = hook.fire().unwrap();
    assert_eq!(*log.lock(), first_order);
    assert_eq!(first.get_bool("seen"), Some(true));
    assert_eq!(second.get_bool("seen"), Some(true));
}

#[test]
fn later_handlers_see_earlier_mutations() {
    let hook = Hook::new("shared");
    let writer = Handler::new("s.writer", |event| {
        event.insert("value", 41);
        Ok(())
    });
    let reader = Handler::new("s.reader", |event| {
        let value = event.get_i64("value").ok_or("writer did not run")?;
        event.insert("value", value + 1);
        Ok(())
    });
    hook.register(&reader, RegisterOptions::new().after("writer")).unwrap();
    hook.register(&writer, RegisterOptions::new()).unwrap();

    let event = hook.fire_with([Context::new().with("value", 0)]).unwrap();
    assert_eq!(event.get_i64("value"), Some(42));
}

#[test]
fn event_carries_calling_hook_and_contexts() {
    let hook = Hook::new("carrier");
    let other = Hook::new("other");
    let checker = Handler::anonymous(|event| {
        let calling = event.calling_hook().ok_or("no calling hook")?;
        assert_eq!(calling.name(), "carrier");
        assert_eq!(event.hook("other").map(Hook::name), Some("other"));
        Ok(())
    });
    hook.register(&checker, RegisterOptions::new()).unwrap();

    let context = Context::new().with("a", 1).with_hook("other", &other);
    let event = hook.fire_with([context, Context::from([("a", 2)])]).unwrap();
    assert_eq!(event.get_i64("a"), Some(2));
}

#[test]
fn json_context_must_be_an_object() {
    let hook = Hook::new("json");
    let context = Context::try_from(serde_json::json!({"user": "nick"})).unwrap();
    assert_eq!(hook.fire_with([context]).unwrap().get_str("user"), Some("nick"));

    let err = Context::try_from(serde_json::json!("not a map")).unwrap_err();
    assert!(matches!(err, HookError::InvalidContext(_)));
}
