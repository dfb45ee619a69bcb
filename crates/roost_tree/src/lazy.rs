//! Operations recorded by a lazy [`HookTree`] until it is committed.

use core::fmt;

use roost_events::{Handler, RegisterOptions};

use crate::error::TreeError;
use crate::tree::HookTree;

/// A deferred closure run against the tree at commit time.
pub type DeferredOp = Box<dyn FnOnce(&HookTree) -> Result<(), TreeError> + Send + Sync>;

/// One operation queued on a lazy tree.
pub enum LazyOp {
    /// [`HookTree::register`] or [`HookTree::register_once`].
    Register {
        /// Path of the target hook.
        path: String,
        /// The handler to register.
        handler: Handler,
        /// Ordering and tag.
        options: RegisterOptions,
        /// Whether the handler runs only once.
        once: bool,
    },
    /// [`HookTree::unregister`].
    Unregister {
        /// Path of the target hook.
        path: String,
        /// The handler to remove.
        handler: Handler,
    },
    /// An arbitrary operation queued with [`HookTree::defer`].
    Deferred {
        /// Shown in replay errors.
        description: String,
        /// The operation.
        op: DeferredOp,
    },
}

impl LazyOp {
    /// Human-readable summary, used in [`TreeError::Replay`].
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Register {
                path,
                handler,
                once: false,
                ..
            } => format!("register {handler} at '{path}'"),
            Self::Register { path, handler, .. } => format!("register {handler} once at '{path}'"),
            Self::Unregister { path, handler } => format!("unregister {handler} from '{path}'"),
            Self::Deferred { description, .. } => description.clone(),
        }
    }

    pub(crate) fn apply(self, tree: &HookTree) -> Result<(), TreeError> {
        match self {
            Self::Register {
                path,
                handler,
                options,
                once,
            } => tree.register_now(&path, &handler, options, once).map(drop),
            Self::Unregister { path, handler } => tree.unregister_now(&path, &handler),
            Self::Deferred { op, .. } => op(tree),
        }
    }
}

impl fmt::Debug for LazyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LazyOp").field(&self.description()).finish()
    }
}
