//! Hook registration, ordering and dispatch for Roost (Layer 1).
//!
//! `roost_events` lets components register handlers against named hooks,
//! order them with before/after references or shared tags, and fire them
//! synchronously against a per-firing [`Event`].
//!
//! # Core Concepts
//!
//! - [`Hook`] - Named dispatch point with a cached, topologically sorted call list
//! - [`Handler`] - Shared callable with an identity and an optional qualified name
//! - [`RegisterOptions`] - Before/after references or a tag for one registration
//! - [`Event`] - Mutable data shared by every handler of one firing
//! - [`HookClass`] - Types instantiated on fire, with methods attached to other hooks
//! - [`yielding`] - Handlers that suspend until another hook fires
//!
//! # Example
//!
//! ```
//! use roost_events::{Handler, Hook, RegisterOptions};
//!
//! let hook = Hook::new("message");
//! let parse = Handler::new("bot.parse.split", |event| {
//!     let words = event.get_str("text").unwrap_or_default().split(' ').count();
//!     event.insert("words", words);
//!     Ok(())
//! });
//! let count = Handler::new("bot.stats.count", |event| {
//!     assert!(event.contains("words"));
//!     Ok(())
//! });
//!
//! hook.register(&count, RegisterOptions::new().after("parse.split")).unwrap();
//! hook.register(&parse, RegisterOptions::new()).unwrap();
//!
//! let event = hook.fire_with([[("text", "hello there")]]).unwrap();
//! assert_eq!(event.get_i64("words"), Some(2));
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`roost_events`): hooks, ordering and dispatch (this crate)
//! - **Layer 2** (`roost_tree`): hook trees, multiplexers and command hooks

/// Class instantiation and per-instance method hooks.
pub mod classreg;

/// Per-hook configuration.
pub mod config;

/// Ordering references and registration options.
pub mod dependency;

/// Error types.
pub mod error;

/// Per-firing event object.
pub mod event;

/// Handler values.
pub mod handler;

/// The hook itself.
pub mod hook;

/// Graph nodes: single registrations and tag groups.
pub mod registration;

/// Dependency resolution and call-list construction.
mod resolve;

/// Topological sorting.
pub mod toposort;

/// Suspending handlers.
pub mod yielding;

pub use classreg::{ClassRegistration, HookClass, InstanceHandle, InstanceId, MethodEntry, MethodTable};
pub use config::{ErrorPolicy, HookConfig};
pub use dependency::{DependencyRef, IntoDependencies, RegisterOptions};
pub use error::HookError;
pub use event::{Context, Event};
pub use handler::{Handler, HandlerError, HandlerId, HandlerResult, Reference};
pub use hook::{Hook, WeakHook};
pub use registration::NodeKey;
pub use yielding::{Coroutine, Resume, yielding};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::classreg::{ClassRegistration, HookClass, InstanceHandle, MethodTable};
    pub use crate::config::{ErrorPolicy, HookConfig};
    pub use crate::dependency::{DependencyRef, RegisterOptions};
    pub use crate::error::HookError;
    pub use crate::event::{Context, Event};
    pub use crate::handler::{Handler, HandlerError, HandlerResult};
    pub use crate::hook::Hook;
    pub use crate::yielding::{Coroutine, Resume, yielding};
}
