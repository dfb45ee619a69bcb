//! Hook trees, multiplexers and command hooks for Roost (Layer 2).
//!
//! Builds on [`roost_events`] hooks to organise them:
//!
//! - [`HookTree`] - Named children addressed by dotted paths, with an optional
//!   lazy mode that records registrations until [`HookTree::commit`]
//! - [`HookMultiplexer`] - Fires one child hook chosen by a context key, with
//!   optional preparer and fallback hooks
//! - Command hooks - Hooks configured with [`HookConfig::command`] that hold a
//!   single unordered main handler plus ordered decorators
//!
//! [`HookConfig::command`]: roost_events::HookConfig::command
//!
//! # Example
//!
//! ```
//! use roost_events::{Handler, RegisterOptions};
//! use roost_tree::{HookTree, MultiplexerConfig};
//!
//! let tree = HookTree::named("bot");
//! tree.create_multiplexer("commands", MultiplexerConfig::commands()).unwrap();
//!
//! let help = Handler::new("bot.commands.help", |event| {
//!     event.insert("reply", "try !ping");
//!     Ok(())
//! });
//! tree.register("commands", &help, RegisterOptions::new()).unwrap();
//!
//! let event = tree.fire("commands.help", [[("user", "ann")]]).unwrap().unwrap();
//! assert_eq!(event.get_str("reply"), Some("try !ping"));
//! ```

/// Error types.
pub mod error;

/// Operations queued by lazy trees.
pub mod lazy;

/// Routing to named child hooks.
pub mod multiplexer;

/// Hook trees.
pub mod tree;

pub use error::TreeError;
pub use lazy::LazyOp;
pub use multiplexer::{HookMultiplexer, MultiplexerConfig};
pub use tree::{HookTree, TreeNode};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::TreeError;
    pub use crate::multiplexer::{HookMultiplexer, MultiplexerConfig};
    pub use crate::tree::{HookTree, TreeNode};
}
