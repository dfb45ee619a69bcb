//! The hook: registration tables, cached call list and dispatch.
//!
//! A [`Hook`] owns every registration made against it. Registrations are
//! grouped into graph nodes (single registrations and tag groups); the first
//! [`fire`](Hook::fire) after a change resolves every before/after reference,
//! sorts the nodes and caches the flattened handler list until the next
//! change.
//!
//! # Cache states
//!
//! A hook is either *dirty* (the next firing rebuilds the call list) or
//! *clean* (the cached list is reused). `register`, `register_once`,
//! `unregister` and tag declarations make it dirty; a firing makes it clean
//! before dispatching.
//!
//! # Example
//!
//! ```
//! use roost_events::{Handler, Hook, HookConfig, RegisterOptions};
//!
//! let hook = Hook::with_config(
//!     "connection_made",
//!     HookConfig::new().with_default_tags(["early", "normal", "late"]),
//! );
//!
//! let log = Handler::new("app.log.record", |event| {
//!     assert_eq!(event.get_bool("authenticated"), Some(true));
//!     Ok(())
//! });
//! let auth = Handler::new("app.auth.check", |event| {
//!     event.insert("authenticated", true);
//!     Ok(())
//! });
//!
//! hook.register(&log, RegisterOptions::tagged("late")).unwrap();
//! hook.register(&auth, RegisterOptions::tagged("early")).unwrap();
//! hook.fire().unwrap();
//! ```

use core::fmt;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::config::{ErrorPolicy, HookConfig};
use crate::dependency::{DependencyRef, IntoDependencies, RegisterOptions};
use crate::error::HookError;
use crate::event::{Context, Event};
use crate::handler::{Handler, HandlerId};
use crate::registration::{NodeKey, SingleRegistration, TagGroup};

type EmptyListener = Arc<dyn Fn(&Hook) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// HookState
// ─────────────────────────────────────────────────────────────────────────────

/// Registration tables of one hook.
#[derive(Default)]
pub(crate) struct HookState {
    /// Canonical handler id → registered handler.
    pub(crate) handlers: HashMap<HandlerId, Handler>,
    /// Reference id → canonical handler id.
    pub(crate) references: HashMap<HandlerId, HandlerId>,
    /// Canonical handler id → owning graph node.
    pub(crate) handler_references: HashMap<HandlerId, NodeKey>,
    /// Fully-qualified reference name → owning graph node.
    pub(crate) reference_names: HashMap<String, NodeKey>,
    /// Single registrations, keyed by canonical handler id.
    pub(crate) registrations: IndexMap<HandlerId, SingleRegistration>,
    /// Tag groups by name.
    pub(crate) tags: IndexMap<String, TagGroup>,
    /// Nodes that currently hold at least one handler, in registration order.
    pub(crate) registration_groups: IndexSet<NodeKey>,
    /// Flattened handlers of the last sort; `None` while dirty.
    pub(crate) call_list: Option<Arc<[Handler]>>,
    /// Node order of the last sort.
    pub(crate) sorted_nodes: Vec<NodeKey>,
}

impl HookState {
    fn invalidate(&mut self) {
        self.call_list = None;
    }

    /// Returns the tag group called `name`, creating it if needed.
    fn vivify_tag(&mut self, name: &str) -> &mut TagGroup {
        if !self.tags.contains_key(name) {
            self.call_list = None;
        }
        self.tags
            .entry(name.to_owned())
            .or_insert_with(|| TagGroup::new(name))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct HookInner {
    name: String,
    config: HookConfig,
    state: RwLock<HookState>,
    empty_listeners: Mutex<Vec<EmptyListener>>,
}

/// A named dispatch point.
///
/// `Hook` is a cheap handle: clones share the same registrations. All
/// methods take `&self`; the tables are guarded by a [`RwLock`] that is never
/// held while handlers run, so handlers may register, unregister or fire
/// hooks (including the one calling them).
#[derive(Clone)]
pub struct Hook {
    inner: Arc<HookInner>,
}

/// A non-owning handle to a [`Hook`].
#[derive(Clone)]
pub struct WeakHook {
    inner: Weak<HookInner>,
}

impl WeakHook {
    /// Returns the hook if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Hook> {
        self.inner.upgrade().map(|inner| Hook { inner })
    }
}

impl Hook {
    /// Creates a hook with the default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, HookConfig::default())
    }

    /// Creates a cancellable hook.
    #[must_use]
    pub fn cancellable(name: impl Into<String>) -> Self {
        Self::with_config(name, HookConfig::new().cancellable())
    }

    /// Creates a hook from a configuration.
    ///
    /// Each default tag is declared to run after the previous one, so the
    /// tags keep their intrinsic order even while empty.
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: HookConfig) -> Self {
        let mut state = HookState::default();
        let mut previous: Option<&str> = None;
        for tag in &config.default_tags {
            let after = previous
                .map(|prev| vec![DependencyRef::Tag(prev.to_owned())])
                .unwrap_or_default();
            state.vivify_tag(tag).dependencies(Vec::new(), after);
            previous = Some(tag);
        }

        Self {
            inner: Arc::new(HookInner {
                name: name.into(),
                config,
                state: RwLock::new(state),
                empty_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The hook's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configuration the hook was created with.
    #[must_use]
    pub fn config(&self) -> &HookConfig {
        &self.inner.config
    }

    /// Returns true if both handles refer to the same hook.
    #[must_use]
    pub fn ptr_eq(&self, other: &Hook) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakHook {
        WeakHook {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a handler and returns it.
    ///
    /// # Errors
    ///
    /// - [`HookError::InvalidOrderRequirements`] if `options` has both a tag
    ///   and before/after references.
    /// - [`HookError::DuplicateRegistration`] if any reference of `handler`
    ///   is already registered.
    /// - [`HookError::AlreadyRegistered`] if this is a command hook whose main
    ///   handler is already registered.
    pub fn register(
        &self,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, HookError> {
        let RegisterOptions {
            before,
            after,
            mut tag,
        } = options;
        let ordered = !before.is_empty() || !after.is_empty();

        if tag.is_some() && ordered {
            return Err(HookError::InvalidOrderRequirements {
                hook: self.inner.name.clone(),
                handler: handler.to_string(),
            });
        }

        let main_tag = self.inner.config.main_tag.as_deref();
        if tag.is_none() && !ordered {
            tag = main_tag.map(str::to_owned);
        }

        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        if let Some(main) = main_tag
            && tag.as_deref() == Some(main)
            && state.tags.get(main).is_some_and(|t| !t.targets.is_empty())
        {
            return Err(HookError::AlreadyRegistered(format!(
                "main handler of command hook '{}'",
                self.inner.name
            )));
        }

        let references = handler.references();
        if let Some(taken) = references
            .iter()
            .find(|r| state.references.contains_key(&r.id()))
        {
            return Err(HookError::DuplicateRegistration {
                hook: self.inner.name.clone(),
                reference: taken.to_string(),
            });
        }

        let id = handler.id();
        let node = match tag {
            Some(tag) => {
                state.vivify_tag(&tag).targets.insert(id);
                NodeKey::Tag(tag)
            }
            None => {
                state.registrations.insert(
                    id,
                    SingleRegistration {
                        handler: id,
                        before,
                        after,
                    },
                );
                NodeKey::Single(id)
            }
        };

        state.handlers.insert(id, handler.clone());
        state.handler_references.insert(id, node.clone());
        for reference in &references {
            state.references.insert(reference.id(), id);
            match reference.name() {
                Some(name) => {
                    if let Some(previous) = state.reference_names.insert(name.to_owned(), node.clone())
                        && previous != node
                    {
                        warn!(hook = %self.inner.name, name, "reference name now points at a different registration");
                    }
                }
                None => {
                    warn!(
                        hook = %self.inner.name,
                        reference = %reference,
                        "handler has no qualified name and can only be referenced directly"
                    );
                }
            }
        }
        state.registration_groups.insert(node.clone());
        state.invalidate();

        debug!(hook = %self.inner.name, handler = %handler, node = %node, "registered handler");
        Ok(handler.clone())
    }

    /// Registers a handler that unregisters itself after its first call.
    ///
    /// The registered wrapper stands in for `handler`, so
    /// [`unregister`](Self::unregister) with the original handler removes it
    /// before it ever runs. The wrapper is removed whether or not the handler
    /// fails. Returns the original handler.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_once(
        &self,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, HookError> {
        let hook = self.downgrade();
        let target = handler.clone();
        let wrapper = handler.wrap(move |event| {
            let result = target.call(event);
            if let Some(hook) = hook.upgrade() {
                match hook.unregister(&target) {
                    Ok(()) | Err(HookError::NotRegistered(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            result
        });

        self.register(&wrapper, options)?;
        Ok(handler.clone())
    }

    /// Removes a handler.
    ///
    /// A tag left empty is deleted unless its ordering was declared. Once the
    /// last handler is gone, the [`on_emptied`](Self::on_emptied) listeners
    /// run.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::NotRegistered`] if any reference of `handler` is
    /// not registered.
    pub fn unregister(&self, handler: &Handler) -> Result<(), HookError> {
        let emptied = {
            let mut guard = self.inner.state.write();
            let state = &mut *guard;
            let references = handler.references();

            if let Some(missing) = references
                .iter()
                .find(|r| !state.references.contains_key(&r.id()))
            {
                return Err(HookError::NotRegistered(format!(
                    "{missing} is not registered to hook '{}'",
                    self.inner.name
                )));
            }

            let canonical = references
                .first()
                .and_then(|r| state.references.get(&r.id()).copied())
                .ok_or_else(|| HookError::NotRegistered(handler.to_string()))?;
            let node = state
                .handler_references
                .remove(&canonical)
                .ok_or_else(|| HookError::NotRegistered(handler.to_string()))?;

            // every alias of the registered handler goes, not only the caller's
            let registered = state
                .handlers
                .remove(&canonical)
                .map_or(references, |registered| registered.references());
            for reference in &registered {
                state.references.remove(&reference.id());
                if let Some(name) = reference.name()
                    && state.reference_names.get(name) == Some(&node)
                {
                    state.reference_names.remove(name);
                }
            }

            match &node {
                NodeKey::Single(id) => {
                    state.registrations.shift_remove(id);
                    state.registration_groups.shift_remove(&node);
                }
                NodeKey::Tag(name) => {
                    let mut collect = false;
                    if let Some(group) = state.tags.get_mut(name) {
                        group.targets.shift_remove(&canonical);
                        collect = group.is_collectable();
                        if group.targets.is_empty() {
                            state.registration_groups.shift_remove(&node);
                        }
                    }
                    if collect && let Some(group) = state.tags.shift_remove(name) {
                        debug!(hook = %self.inner.name, tag = %group.name, "deleted empty tag");
                    }
                }
            }
            state.invalidate();

            debug!(hook = %self.inner.name, handler = %handler, "unregistered handler");
            state.handlers.is_empty()
        };

        if emptied {
            self.notify_emptied();
        }
        Ok(())
    }

    /// Declares a tag's ordering and protects it from deletion.
    ///
    /// Creates the tag if needed. Replaces any ordering declared before.
    /// Returns a reference to the tag for use in other registrations.
    pub fn declare_tag(
        &self,
        name: &str,
        before: impl IntoDependencies,
        after: impl IntoDependencies,
    ) -> DependencyRef {
        let mut state = self.inner.state.write();
        state
            .vivify_tag(name)
            .dependencies(before.into_dependencies(), after.into_dependencies());
        state.invalidate();
        DependencyRef::Tag(name.to_owned())
    }

    /// Returns a reference to the tag called `name`, creating it if needed.
    pub fn tag(&self, name: &str) -> DependencyRef {
        self.inner.state.write().vivify_tag(name);
        DependencyRef::Tag(name.to_owned())
    }

    /// Runs `listener` every time the hook loses its last handler.
    pub fn on_emptied(&self, listener: impl Fn(&Hook) + Send + Sync + 'static) {
        self.inner.empty_listeners.lock().push(Arc::new(listener));
    }

    fn notify_emptied(&self) {
        let listeners: Vec<EmptyListener> = self.inner.empty_listeners.lock().clone();
        for listener in listeners {
            listener(self);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Firing
    // ─────────────────────────────────────────────────────────────────────

    /// Fires the hook with an empty context.
    ///
    /// # Errors
    ///
    /// See [`fire_with`](Self::fire_with).
    pub fn fire(&self) -> Result<Event, HookError> {
        self.fire_with(core::iter::empty::<Context>())
    }

    /// Fires the hook, merging `contexts` into a fresh event.
    ///
    /// Returns the event after every handler ran, or after a handler
    /// cancelled a cancellable hook.
    ///
    /// # Errors
    ///
    /// - [`HookError::DependencyMissing`], [`HookError::CyclicDependency`] or
    ///   [`HookError::NameResolution`] if the call list cannot be rebuilt.
    /// - [`HookError::Handler`] if a handler fails and the hook propagates
    ///   handler errors.
    pub fn fire_with<I, C>(&self, contexts: I) -> Result<Event, HookError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Context>,
    {
        let call_list = self.call_list()?;
        let mut event = Event::assemble(contexts.into_iter().map(Into::into), self);
        self.dispatch(&call_list, &mut event)?;
        Ok(event)
    }

    fn call_list(&self) -> Result<Arc<[Handler]>, HookError> {
        {
            let state = self.inner.state.read();
            if let Some(list) = &state.call_list {
                return Ok(Arc::clone(list));
            }
        }

        let mut state = self.inner.state.write();
        if let Some(list) = &state.call_list {
            return Ok(Arc::clone(list));
        }
        state.rebuild(&self.inner.name)
    }

    fn dispatch(&self, call_list: &[Handler], event: &mut Event) -> Result<(), HookError> {
        for (index, handler) in call_list.iter().enumerate() {
            if self.inner.config.cancellable && index > 0 && event.is_cancelled() {
                trace!(
                    hook = %self.inner.name,
                    skipped = call_list.len() - index,
                    "firing cancelled"
                );
                break;
            }

            if let Err(source) = handler.call(event) {
                match self.inner.config.error_policy {
                    ErrorPolicy::Propagate => {
                        return Err(HookError::Handler {
                            hook: self.inner.name.clone(),
                            handler: handler.to_string(),
                            source,
                        });
                    }
                    ErrorPolicy::LogAndContinue => {
                        error!(
                            hook = %self.inner.name,
                            handler = %handler,
                            error = %source,
                            "handler failed"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.state.read().handlers.len()
    }

    /// Returns true if every reference of `handler` is registered.
    #[must_use]
    pub fn is_registered(&self, handler: &Handler) -> bool {
        let state = self.inner.state.read();
        handler
            .references()
            .iter()
            .all(|r| state.references.contains_key(&r.id()))
    }

    /// Returns true if the tag table holds `name`.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.inner.state.read().tags.contains_key(name)
    }

    /// Returns true if the next firing must rebuild the call list.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.state.read().call_list.is_none()
    }

    /// Node order of the last successful sort.
    #[must_use]
    pub fn sorted_nodes(&self) -> Vec<NodeKey> {
        self.inner.state.read().sorted_nodes.clone()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}
