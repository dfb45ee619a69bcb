//! Error types for hook registration, resolution and firing.

use crate::handler::HandlerError;

/// Errors raised by [`Hook`](crate::Hook) operations.
///
/// The variants fall into four groups:
///
/// - **Configuration** (raised by `register*` calls): [`DuplicateRegistration`],
///   [`InvalidOrderRequirements`], [`AlreadyRegistered`], [`NotInstantiable`]
/// - **Resolution** (raised by the first `fire` after a change):
///   [`DependencyMissing`], [`CyclicDependency`]
/// - **Lifecycle**: [`NotRegistered`]
/// - **Dispatch**: [`Handler`], [`InvalidContext`]
///
/// [`NameResolution`] is only ever logged by the hook itself; it surfaces as an
/// error when a direct handler reference or a multiplexer child name cannot be
/// resolved.
///
/// [`DuplicateRegistration`]: HookError::DuplicateRegistration
/// [`InvalidOrderRequirements`]: HookError::InvalidOrderRequirements
/// [`AlreadyRegistered`]: HookError::AlreadyRegistered
/// [`NotInstantiable`]: HookError::NotInstantiable
/// [`DependencyMissing`]: HookError::DependencyMissing
/// [`CyclicDependency`]: HookError::CyclicDependency
/// [`NotRegistered`]: HookError::NotRegistered
/// [`Handler`]: HookError::Handler
/// [`InvalidContext`]: HookError::InvalidContext
/// [`NameResolution`]: HookError::NameResolution
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// One of the handler's references is already registered to the hook.
    #[error("{reference} registered twice to hook '{hook}'")]
    DuplicateRegistration {
        /// The hook name.
        hook: String,
        /// Display name of the colliding reference.
        reference: String,
    },

    /// A registration asked for both a tag and explicit before/after ordering.
    #[error("{handler} registered to hook '{hook}' with both tag and dependency")]
    InvalidOrderRequirements {
        /// The hook name.
        hook: String,
        /// Display name of the offending handler.
        handler: String,
    },

    /// Something that must only be registered once was registered again.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// A class cannot be registered for instantiation.
    #[error("cannot register class '{class}' for instantiation: {reason}")]
    NotInstantiable {
        /// The class name.
        class: String,
        /// Why the class was rejected.
        reason: String,
    },

    /// An unregistration or free targeted something that is not registered.
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// A name could not be computed or resolved.
    #[error("name resolution failed: {0}")]
    NameResolution(String),

    /// A before/after reference matched no handler and no tag.
    #[error("hook '{hook}': could not resolve dependency {dependency:?} of {node}")]
    DependencyMissing {
        /// The hook name.
        hook: String,
        /// The reference exactly as it was given.
        dependency: String,
        /// Display name of the node that declared the dependency.
        node: String,
    },

    /// The ordering constraints form a loop.
    #[error("hook '{hook}': unresolvable dependency loop among {nodes:?}")]
    CyclicDependency {
        /// The hook name.
        hook: String,
        /// Display names of the nodes that could not be ordered.
        nodes: Vec<String>,
    },

    /// A handler failed while the hook propagates handler errors.
    #[error("hook '{hook}': handler {handler} failed: {source}")]
    Handler {
        /// The hook name.
        hook: String,
        /// Display name of the failing handler.
        handler: String,
        /// The error returned by the handler.
        #[source]
        source: HandlerError,
    },

    /// A context passed to `fire` was not a key/value mapping.
    #[error("fire context must be a JSON object, got {0}")]
    InvalidContext(String),
}

impl HookError {
    /// Returns true for errors a caller can only fix by changing registrations.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            HookError::DuplicateRegistration { .. }
                | HookError::InvalidOrderRequirements { .. }
                | HookError::AlreadyRegistered(_)
                | HookError::NotInstantiable { .. }
                | HookError::DependencyMissing { .. }
                | HookError::CyclicDependency { .. }
        )
    }
}
