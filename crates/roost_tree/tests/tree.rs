//! Hook trees: paths, lazy commit and multiplexer children.

use std::sync::Arc;

use parking_lot::Mutex;
use roost_events::prelude::*;
use roost_tree::prelude::*;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(name: &str, label: &'static str, log: &Log) -> Handler {
    let log = Arc::clone(log);
    Handler::new(name, move |_| {
        log.lock().push(label);
        Ok(())
    })
}

#[test]
fn lazy_tree_accepts_forward_references() {
    let tree = HookTree::named("bot").lazy();
    let log = Log::default();

    // both the hook and the dependency target are declared afterwards
    tree.register(
        "chat.message",
        &recorder("plugins.logger.log", "log", &log),
        RegisterOptions::new().after("plugins.parser.parse"),
    )
    .unwrap();
    tree.register(
        "chat.message",
        &recorder("plugins.parser.parse", "parse", &log),
        RegisterOptions::new(),
    )
    .unwrap();
    assert_eq!(tree.pending_operations(), 2);

    tree.create_subtree("chat")
        .unwrap()
        .create_hook("message", None)
        .unwrap();
    tree.commit().unwrap();

    assert_eq!(tree.pending_operations(), 0);
    tree.fire("chat.message", core::iter::empty::<Context>())
        .unwrap();
    assert_eq!(*log.lock(), vec!["parse", "log"]);
}

#[test]
fn unresolvable_path_fails_the_commit() {
    let tree = HookTree::new().lazy();
    tree.create_hook("exists", None).unwrap();
    let handler = Handler::new("plugins.a.handler", |_| Ok(()));

    tree.register("exists", &handler, RegisterOptions::new())
        .unwrap();
    tree.register("nowhere.hook", &handler, RegisterOptions::new())
        .unwrap();

    let err = tree.commit().unwrap_err();
    match err {
        TreeError::Replay {
            index, source, ..
        } => {
            assert_eq!(index, 1);
            assert!(matches!(
                *source,
                TreeError::NoSuchPath { ref segment, .. } if segment == "nowhere"
            ));
        }
        other => panic!("expected a replay error, got {other}"),
    }
    // operations before the failure were applied
    assert_eq!(tree.hook("exists").unwrap().handler_count(), 1);
}

#[test]
fn eager_tree_reports_errors_immediately() {
    let tree = HookTree::new();
    let handler = Handler::new("plugins.a.handler", |_| Ok(()));
    assert!(matches!(
        tree.register("missing", &handler, RegisterOptions::new()),
        Err(TreeError::NoSuchPath { .. })
    ));

    tree.create_hook("hook", None).unwrap();
    tree.register("hook", &handler, RegisterOptions::new())
        .unwrap();
    assert!(matches!(
        tree.register("hook", &handler, RegisterOptions::new()),
        Err(TreeError::Hook(HookError::DuplicateRegistration { .. }))
    ));

    tree.unregister("hook", &handler).unwrap();
    assert_eq!(tree.hook("hook").unwrap().handler_count(), 0);
}

#[test]
fn multiplexer_children_are_addressed_by_path() {
    let tree = HookTree::named("bot");
    let commands = tree.create_subtree("commands").unwrap();
    commands
        .create_multiplexer("chat", MultiplexerConfig::commands())
        .unwrap();
    let log = Log::default();

    tree.register(
        "commands.chat.ping",
        &recorder("plugins.ping.reply", "pong", &log),
        RegisterOptions::new(),
    )
    .unwrap();
    tree.register(
        "commands.chat",
        &recorder("plugins.misc.echo", "echo", &log),
        RegisterOptions::new(),
    )
    .unwrap();

    let mux = tree.multiplexer("commands.chat").unwrap();
    assert_eq!(mux.name(), "bot.commands.chat");
    assert_eq!(mux.child_names(), vec!["ping".to_owned(), "echo".to_owned()]);
    assert_eq!(tree.hook("commands.chat.ping").unwrap().name(), "bot.commands.chat[ping]");

    tree.fire("commands.chat.echo", core::iter::empty::<Context>())
        .unwrap();
    tree.fire("commands.chat", [[("name", "ping")]]).unwrap();
    assert_eq!(*log.lock(), vec!["echo", "pong"]);

    assert!(matches!(
        tree.fire("commands", core::iter::empty::<Context>()),
        Err(TreeError::WrongKind { .. })
    ));
}

#[test]
fn lazy_tree_records_unregistration_and_command_hooks() {
    let tree = HookTree::new().lazy();
    let ping = tree.create_command_hook("ping").unwrap();
    let first = Handler::new("plugins.a.ping", |_| Ok(()));
    let second = Handler::new("plugins.b.ping", |_| Ok(()));

    tree.register("ping", &first, RegisterOptions::new()).unwrap();
    tree.unregister("ping", &first).unwrap();
    tree.register("ping", &second, RegisterOptions::new()).unwrap();
    assert_eq!(ping.handler_count(), 0);

    // the main slot is free again after the recorded unregistration
    tree.commit().unwrap();
    assert!(ping.is_registered(&second));
    assert!(!ping.is_registered(&first));

    let conflicting = Handler::new("plugins.c.ping", |_| Ok(()));
    assert!(matches!(
        tree.register("ping", &conflicting, RegisterOptions::new()),
        Err(TreeError::Hook(HookError::AlreadyRegistered(_)))
    ));
}
