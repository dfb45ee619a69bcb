//! Error types for hook trees and multiplexers.

use roost_events::HookError;

/// Errors raised by [`HookTree`](crate::HookTree) and
/// [`HookMultiplexer`](crate::HookMultiplexer) operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A child with this name already exists.
    #[error("tree '{tree}' already has a child named '{name}'")]
    DuplicateChild {
        /// Display name of the tree.
        tree: String,
        /// The duplicate child name.
        name: String,
    },

    /// A path segment names no child.
    #[error("cannot resolve '{path}': no child named '{segment}'")]
    NoSuchPath {
        /// The full path.
        path: String,
        /// The first segment that did not resolve.
        segment: String,
    },

    /// A path resolved to the wrong kind of node.
    #[error("'{path}' does not name a {expected}")]
    WrongKind {
        /// The full path.
        path: String,
        /// What the operation needed.
        expected: &'static str,
    },

    /// A multiplexer was fired without its selector.
    #[error("multiplexer '{multiplexer}' fired without '{selector}'")]
    MissingSelector {
        /// The multiplexer name.
        multiplexer: String,
        /// The selector key.
        selector: String,
    },

    /// A multiplexer's selector holds something other than a child name.
    #[error("multiplexer '{multiplexer}' needs a string in '{selector}', got {value}")]
    InvalidSelector {
        /// The multiplexer name.
        multiplexer: String,
        /// The selector key.
        selector: String,
        /// The offending value, as JSON.
        value: String,
    },

    /// A multiplexer has no child for the selected name.
    #[error("multiplexer '{multiplexer}' has no child '{child}'")]
    NoSuchChild {
        /// The multiplexer name.
        multiplexer: String,
        /// The requested child.
        child: String,
    },

    /// A recorded operation failed while a lazy tree was committed.
    #[error("replaying operation {index} ({operation}) failed: {source}")]
    Replay {
        /// Position of the operation in the recorded queue.
        index: usize,
        /// Description of the operation.
        operation: String,
        /// The failure.
        #[source]
        source: Box<TreeError>,
    },

    /// A hook operation failed.
    #[error(transparent)]
    Hook(#[from] HookError),
}
