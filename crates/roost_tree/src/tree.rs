//! Named hierarchies of hooks, addressed by dotted paths.

use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use roost_events::{Context, Event, Handler, Hook, HookConfig, HookError, RegisterOptions};
use tracing::debug;

use crate::error::TreeError;
use crate::lazy::LazyOp;
use crate::multiplexer::{HookMultiplexer, MultiplexerConfig};

// ─────────────────────────────────────────────────────────────────────────────
// TreeNode
// ─────────────────────────────────────────────────────────────────────────────

/// A child of a [`HookTree`].
#[derive(Debug, Clone)]
pub enum TreeNode {
    /// A plain or command hook.
    Hook(Hook),
    /// A nested tree.
    Tree(HookTree),
    /// A router over named child hooks.
    Multiplexer(HookMultiplexer),
}

impl TreeNode {
    /// The hook, if this node is one.
    #[must_use]
    pub fn as_hook(&self) -> Option<&Hook> {
        match self {
            Self::Hook(hook) => Some(hook),
            _ => None,
        }
    }

    /// The subtree, if this node is one.
    #[must_use]
    pub fn as_tree(&self) -> Option<&HookTree> {
        match self {
            Self::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// The multiplexer, if this node is one.
    #[must_use]
    pub fn as_multiplexer(&self) -> Option<&HookMultiplexer> {
        match self {
            Self::Multiplexer(mux) => Some(mux),
            _ => None,
        }
    }
}

/// What a path resolved to.
enum Target {
    Node(TreeNode),
    MultiplexerChild(HookMultiplexer, String),
}

// ─────────────────────────────────────────────────────────────────────────────
// HookTree
// ─────────────────────────────────────────────────────────────────────────────

struct TreeState {
    children: IndexMap<String, TreeNode>,
    pending: Option<Vec<LazyOp>>,
    default_config: HookConfig,
}

struct TreeInner {
    name: Option<String>,
    state: RwLock<TreeState>,
}

/// A tree of hooks, subtrees and multiplexers.
///
/// Children are addressed by dotted paths such as `"chat.commands.ping"`; a
/// segment following a multiplexer names one of its children.
///
/// A lazy tree records registrations until [`commit`](Self::commit), so
/// handlers can reference hooks and names that are declared later.
///
/// # Example
///
/// ```
/// use roost_events::{Handler, RegisterOptions};
/// use roost_tree::HookTree;
///
/// let tree = HookTree::named("bot").lazy();
/// let chat = tree.create_subtree("chat").unwrap();
///
/// // queued: "chat.message" does not exist yet
/// let log = Handler::new("bot.log.message", |_| Ok(()));
/// tree.register("chat.message", &log, RegisterOptions::new()).unwrap();
///
/// chat.create_hook("message", None).unwrap();
/// tree.commit().unwrap();
///
/// assert_eq!(tree.hook("chat.message").unwrap().handler_count(), 1);
/// ```
#[derive(Clone)]
pub struct HookTree {
    inner: Arc<TreeInner>,
}

impl Default for HookTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTree {
    /// Creates an unnamed, eager tree.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, false, HookConfig::default())
    }

    /// Creates a named tree; child hooks are named `"<name>.<child>"`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()), false, HookConfig::default())
    }

    fn build(name: Option<String>, lazy: bool, default_config: HookConfig) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                name,
                state: RwLock::new(TreeState {
                    children: IndexMap::new(),
                    pending: lazy.then(Vec::new),
                    default_config,
                }),
            }),
        }
    }

    /// Makes the tree record operations until [`commit`](Self::commit).
    #[must_use]
    pub fn lazy(self) -> Self {
        {
            let mut state = self.inner.state.write();
            if state.pending.is_none() {
                state.pending = Some(Vec::new());
            }
        }
        self
    }

    /// Sets the configuration of hooks created without one.
    #[must_use]
    pub fn with_default_config(self, config: HookConfig) -> Self {
        self.inner.state.write().default_config = config;
        self
    }

    /// The tree's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns true while operations are being recorded.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.inner.state.read().pending.is_some()
    }

    /// Number of operations waiting for [`commit`](Self::commit).
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.inner
            .state
            .read()
            .pending
            .as_ref()
            .map_or(0, Vec::len)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Children
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a hook child.
    ///
    /// Uses the tree's default configuration when `config` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateChild`] if the name is taken.
    pub fn create_hook(&self, name: &str, config: Option<HookConfig>) -> Result<Hook, TreeError> {
        let mut state = self.inner.state.write();
        self.check_free(&state, name)?;

        let config = config.unwrap_or_else(|| state.default_config.clone());
        let hook = Hook::with_config(self.child_name(name), config);
        state.children.insert(name.to_owned(), TreeNode::Hook(hook.clone()));

        debug!(tree = %self, hook = hook.name(), "created hook");
        Ok(hook)
    }

    /// Creates a command hook child: one unordered main handler plus
    /// optional ordered decorators.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateChild`] if the name is taken.
    pub fn create_command_hook(&self, name: &str) -> Result<Hook, TreeError> {
        self.create_hook(name, Some(HookConfig::new().command()))
    }

    /// Creates a nested tree sharing this tree's laziness and default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateChild`] if the name is taken.
    pub fn create_subtree(&self, name: &str) -> Result<HookTree, TreeError> {
        let mut state = self.inner.state.write();
        self.check_free(&state, name)?;

        let tree = Self::build(
            Some(self.child_name(name)),
            state.pending.is_some(),
            state.default_config.clone(),
        );
        state.children.insert(name.to_owned(), TreeNode::Tree(tree.clone()));

        debug!(tree = %self, subtree = name, "created subtree");
        Ok(tree)
    }

    /// Creates a multiplexer child.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateChild`] if the name is taken.
    pub fn create_multiplexer(
        &self,
        name: &str,
        config: MultiplexerConfig,
    ) -> Result<HookMultiplexer, TreeError> {
        let mut state = self.inner.state.write();
        self.check_free(&state, name)?;

        let mux = HookMultiplexer::new(self.child_name(name), config);
        state
            .children
            .insert(name.to_owned(), TreeNode::Multiplexer(mux.clone()));

        debug!(tree = %self, multiplexer = mux.name(), "created multiplexer");
        Ok(mux)
    }

    /// Adds an existing hook under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateChild`] if the name is taken.
    pub fn add_hook(&self, name: &str, hook: &Hook) -> Result<(), TreeError> {
        let mut state = self.inner.state.write();
        self.check_free(&state, name)?;
        state.children.insert(name.to_owned(), TreeNode::Hook(hook.clone()));
        Ok(())
    }

    /// Returns the direct child called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TreeNode> {
        self.inner.state.read().children.get(name).cloned()
    }

    /// Names of the direct children, in creation order.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        self.inner.state.read().children.keys().cloned().collect()
    }

    fn check_free(&self, state: &TreeState, name: &str) -> Result<(), TreeError> {
        if state.children.contains_key(name) {
            return Err(TreeError::DuplicateChild {
                tree: self.to_string(),
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn child_name(&self, name: &str) -> String {
        match &self.inner.name {
            Some(tree) => format!("{tree}.{name}"),
            None => name.to_owned(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Paths
    // ─────────────────────────────────────────────────────────────────────

    fn resolve(&self, path: &str) -> Result<Target, TreeError> {
        let no_such = |segment: &str| TreeError::NoSuchPath {
            path: path.to_owned(),
            segment: segment.to_owned(),
        };

        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut node = self.get(first).ok_or_else(|| no_such(first))?;

        while let Some(segment) = segments.next() {
            node = match node {
                TreeNode::Tree(tree) => tree.get(segment).ok_or_else(|| no_such(segment))?,
                TreeNode::Multiplexer(mux) => {
                    if let Some(extra) = segments.next() {
                        return Err(no_such(extra));
                    }
                    return Ok(Target::MultiplexerChild(mux, segment.to_owned()));
                }
                TreeNode::Hook(_) => return Err(no_such(segment)),
            };
        }
        Ok(Target::Node(node))
    }

    /// Returns the hook at `path`, including existing multiplexer children.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NoSuchPath`] if a segment does not resolve.
    /// - [`TreeError::WrongKind`] if the path names a tree or multiplexer.
    pub fn hook(&self, path: &str) -> Result<Hook, TreeError> {
        match self.resolve(path)? {
            Target::Node(TreeNode::Hook(hook)) => Ok(hook),
            Target::MultiplexerChild(mux, child) => {
                mux.child(&child).ok_or_else(|| TreeError::NoSuchPath {
                    path: path.to_owned(),
                    segment: child,
                })
            }
            Target::Node(_) => Err(wrong_kind(path, "hook")),
        }
    }

    /// Returns the subtree at `path`.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NoSuchPath`] if a segment does not resolve.
    /// - [`TreeError::WrongKind`] if the path names something else.
    pub fn subtree(&self, path: &str) -> Result<HookTree, TreeError> {
        match self.resolve(path)? {
            Target::Node(TreeNode::Tree(tree)) => Ok(tree),
            _ => Err(wrong_kind(path, "tree")),
        }
    }

    /// Returns the multiplexer at `path`.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NoSuchPath`] if a segment does not resolve.
    /// - [`TreeError::WrongKind`] if the path names something else.
    pub fn multiplexer(&self, path: &str) -> Result<HookMultiplexer, TreeError> {
        match self.resolve(path)? {
            Target::Node(TreeNode::Multiplexer(mux)) => Ok(mux),
            _ => Err(wrong_kind(path, "multiplexer")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Registers `handler` with the hook at `path`.
    ///
    /// A path ending at a multiplexer registers with the child named after
    /// the handler; `"mux.child"` names the child explicitly. On a lazy tree
    /// the operation is recorded and the handler returned unchanged.
    ///
    /// # Errors
    ///
    /// Path errors from [`hook`](Self::hook) and any error of
    /// [`Hook::register`]. Lazy trees report them from
    /// [`commit`](Self::commit) instead.
    pub fn register(
        &self,
        path: &str,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, TreeError> {
        self.register_or_record(path, handler, options, false)
    }

    /// Registers `handler` at `path` for a single call.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_once(
        &self,
        path: &str,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, TreeError> {
        self.register_or_record(path, handler, options, true)
    }

    /// Removes `handler` from the hook at `path`.
    ///
    /// # Errors
    ///
    /// Path errors and any error of [`Hook::unregister`]. Lazy trees report
    /// them from [`commit`](Self::commit) instead.
    pub fn unregister(&self, path: &str, handler: &Handler) -> Result<(), TreeError> {
        let op = LazyOp::Unregister {
            path: path.to_owned(),
            handler: handler.clone(),
        };
        match self.record(op) {
            Some(_) => self.unregister_now(path, handler),
            None => Ok(()),
        }
    }

    /// Runs `op` now, or at commit time on a lazy tree.
    ///
    /// # Errors
    ///
    /// Whatever `op` returns when it runs immediately.
    pub fn defer<F>(&self, description: impl Into<String>, op: F) -> Result<(), TreeError>
    where
        F: FnOnce(&HookTree) -> Result<(), TreeError> + Send + Sync + 'static,
    {
        let queued = LazyOp::Deferred {
            description: description.into(),
            op: Box::new(op),
        };
        match self.record(queued) {
            Some(op) => op.apply(self),
            None => Ok(()),
        }
    }

    fn register_or_record(
        &self,
        path: &str,
        handler: &Handler,
        options: RegisterOptions,
        once: bool,
    ) -> Result<Handler, TreeError> {
        let op = LazyOp::Register {
            path: path.to_owned(),
            handler: handler.clone(),
            options,
            once,
        };
        match self.record(op) {
            Some(LazyOp::Register { options, .. }) => self.register_now(path, handler, options, once),
            _ => Ok(handler.clone()),
        }
    }

    /// Queues `op` on a lazy tree, or hands it back to run now.
    fn record(&self, op: LazyOp) -> Option<LazyOp> {
        let mut state = self.inner.state.write();
        match state.pending.as_mut() {
            Some(pending) => {
                debug!(tree = %self, operation = %op.description(), "recorded");
                pending.push(op);
                None
            }
            None => Some(op),
        }
    }

    pub(crate) fn register_now(
        &self,
        path: &str,
        handler: &Handler,
        options: RegisterOptions,
        once: bool,
    ) -> Result<Handler, TreeError> {
        match self.resolve(path)? {
            Target::Node(TreeNode::Hook(hook)) if once => Ok(hook.register_once(handler, options)?),
            Target::Node(TreeNode::Hook(hook)) => Ok(hook.register(handler, options)?),
            Target::Node(TreeNode::Multiplexer(mux)) if once => mux.register_once(None, handler, options),
            Target::Node(TreeNode::Multiplexer(mux)) => mux.register(None, handler, options),
            Target::MultiplexerChild(mux, child) if once => {
                mux.register_once(Some(&child), handler, options)
            }
            Target::MultiplexerChild(mux, child) => mux.register(Some(&child), handler, options),
            Target::Node(TreeNode::Tree(_)) => Err(wrong_kind(path, "hook")),
        }
    }

    pub(crate) fn unregister_now(&self, path: &str, handler: &Handler) -> Result<(), TreeError> {
        match self.resolve(path)? {
            Target::Node(TreeNode::Hook(hook)) => Ok(hook.unregister(handler)?),
            Target::Node(TreeNode::Multiplexer(mux)) => mux.unregister(handler),
            Target::MultiplexerChild(mux, child) => match mux.child(&child) {
                Some(hook) => Ok(hook.unregister(handler)?),
                None => Err(HookError::NotRegistered(format!("{handler} at '{path}'")).into()),
            },
            Target::Node(TreeNode::Tree(_)) => Err(wrong_kind(path, "hook")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commit and fire
    // ─────────────────────────────────────────────────────────────────────

    /// Replays the recorded operations in order, then commits subtrees.
    ///
    /// The tree is eager afterwards. Replay stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Replay`] naming the failed operation.
    pub fn commit(&self) -> Result<(), TreeError> {
        let pending = self.inner.state.write().pending.take().unwrap_or_default();
        debug!(tree = %self, operations = pending.len(), "committing");

        for (index, op) in pending.into_iter().enumerate() {
            let operation = op.description();
            op.apply(self).map_err(|source| TreeError::Replay {
                index,
                operation,
                source: Box::new(source),
            })?;
        }

        let subtrees: Vec<HookTree> = self
            .inner
            .state
            .read()
            .children
            .values()
            .filter_map(|node| node.as_tree().cloned())
            .collect();
        for subtree in subtrees {
            subtree.commit()?;
        }
        Ok(())
    }

    /// Fires whatever `path` names.
    ///
    /// For a multiplexer child the selector is set to the child name after
    /// `contexts` are merged. Returns `None` when a multiplexer routes
    /// nowhere.
    ///
    /// # Errors
    ///
    /// Path errors, [`TreeError::WrongKind`] for trees, and any firing error.
    pub fn fire<I, C>(&self, path: &str, contexts: I) -> Result<Option<Event>, TreeError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Context>,
    {
        let contexts = contexts.into_iter().map(Into::into);
        match self.resolve(path)? {
            Target::Node(TreeNode::Hook(hook)) => Ok(Some(hook.fire_with(contexts)?)),
            Target::Node(TreeNode::Multiplexer(mux)) => mux.fire_with(contexts),
            Target::MultiplexerChild(mux, child) => {
                let selected = Context::new().with(mux.config().selector.clone(), child);
                mux.fire_with(contexts.chain([selected]))
            }
            Target::Node(TreeNode::Tree(_)) => Err(wrong_kind(path, "hook or multiplexer")),
        }
    }
}

fn wrong_kind(path: &str, expected: &'static str) -> TreeError {
    TreeError::WrongKind {
        path: path.to_owned(),
        expected,
    }
}

impl fmt::Display for HookTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name.as_deref().unwrap_or("<root>"))
    }
}

impl fmt::Debug for HookTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("HookTree")
            .field("name", &self.inner.name)
            .field("children", &state.children.keys().collect::<Vec<_>>())
            .field("pending", &state.pending.as_ref().map(Vec::len))
            .finish()
    }
}
