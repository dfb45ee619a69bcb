//! One-shot registrations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use roost_events::prelude::*;

fn counting(name: &str, counter: &Arc<AtomicUsize>) -> Handler {
    let counter = Arc::clone(counter);
    Handler::new(name, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn once_handler_runs_exactly_once() {
    let hook = Hook::new("once");
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = counting("o.handler", &calls);

    let returned = hook.register_once(&handler, RegisterOptions::new()).unwrap();
    assert_eq!(returned, handler);
    assert!(hook.is_registered(&handler));

    for _ in 0..3 {
        hook.fire().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!hook.is_registered(&handler));
    assert_eq!(hook.handler_count(), 0);
}

#[test]
fn once_handler_leaves_the_cached_call_list() {
    let hook = Hook::new("cache");
    let steady_calls = Arc::new(AtomicUsize::new(0));
    let once_calls = Arc::new(AtomicUsize::new(0));
    hook.register(&counting("c.steady", &steady_calls), RegisterOptions::new())
        .unwrap();
    hook.register_once(&counting("c.once", &once_calls), RegisterOptions::new())
        .unwrap();

    hook.fire().unwrap();
    assert!(hook.is_dirty());
    hook.fire().unwrap();
    assert!(!hook.is_dirty());
    assert_eq!(hook.handler_count(), 1);

    assert_eq!(steady_calls.load(Ordering::SeqCst), 2);
    assert_eq!(once_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn once_handler_can_be_unregistered_by_original() {
    let hook = Hook::new("cancel_once");
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = counting("u.handler", &calls);

    hook.register_once(&handler, RegisterOptions::new()).unwrap();
    hook.unregister(&handler).unwrap();
    hook.fire().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        hook.unregister(&handler),
        Err(HookError::NotRegistered(_))
    ));
}

#[test]
fn once_handler_is_referenceable_by_name() {
    let hook = Hook::new("named_once");
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let first_order = Arc::clone(&order);
    let first = Handler::new("n.first", move |_| {
        first_order.lock().push("first");
        Ok(())
    });
    let second_order = Arc::clone(&order);
    let second = Handler::new("n.second", move |_| {
        second_order.lock().push("second");
        Ok(())
    });

    hook.register(&second, RegisterOptions::new().after("first"))
        .unwrap();
    hook.register_once(&first, RegisterOptions::new()).unwrap();

    hook.fire().unwrap();
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn failing_once_handler_is_still_removed() {
    let hook = Hook::with_config(
        "failing_once",
        HookConfig::new().with_error_policy(ErrorPolicy::LogAndContinue),
    );
    let handler = Handler::new("f.broken", |_| Err("nope".into()));
    hook.register_once(&handler, RegisterOptions::new()).unwrap();

    hook.fire().unwrap();
    assert!(!hook.is_registered(&handler));
}

#[test]
fn registering_once_twice_collides() {
    let hook = Hook::new("dup_once");
    let handler = Handler::new("d.handler", |_| Ok(()));
    hook.register_once(&handler, RegisterOptions::new()).unwrap();
    assert!(matches!(
        hook.register(&handler, RegisterOptions::new()),
        Err(HookError::DuplicateRegistration { .. })
    ));
}

#[test]
fn once_handler_in_tag_collects_the_tag() {
    let hook = Hook::new("tagged_once");
    let handler = Handler::new("t.handler", |_| Ok(()));
    hook.register_once(&handler, RegisterOptions::tagged("transient"))
        .unwrap();
    assert!(hook.has_tag("transient"));

    hook.fire().unwrap();
    assert!(!hook.has_tag("transient"));
}
