//! In-process hook dispatch with dependency-ordered handlers, tag groups and
//! hook trees.
//!

pub use roost_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use roost_internal::prelude::*;
}
