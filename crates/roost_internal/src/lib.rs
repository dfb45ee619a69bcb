//! # Roost Internal Library
//!
//! Re-exports the Roost layer crates for convenience.

/// Layer 1: hooks, ordering and dispatch.
pub use roost_events;

/// Layer 2: hook trees, multiplexers and command hooks.
pub use roost_tree;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use roost_events::prelude::*;
    pub use roost_tree::prelude::*;
}
