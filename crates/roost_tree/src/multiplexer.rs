//! Routing a firing to one named child hook.
//!
//! A [`HookMultiplexer`] reads a selector (by default `"name"`) from the
//! firing context and fires the child hook of that name. An optional
//! preparer hook runs first and may rewrite the selector, decline routing by
//! removing it, or cancel the dispatch when it is cancellable. Requests for
//! unknown children raise, go to a `missing` fallback hook, or do nothing,
//! depending on [`MultiplexerConfig`].
//!
//! Child hooks are created on first registration and dropped again once
//! their last handler is unregistered.

use core::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use roost_events::{Context, Event, Handler, Hook, HookConfig, HookError, RegisterOptions};
use serde_json::Value;
use tracing::debug;

use crate::error::TreeError;

// ─────────────────────────────────────────────────────────────────────────────
// MultiplexerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of a [`HookMultiplexer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexerConfig {
    /// Context key holding the child name.
    pub selector: String,
    /// Fail when no child matches (and no `missing` hook is configured).
    pub raise_on_missing: bool,
    /// Fail when the selector is absent.
    pub raise_on_noname: bool,
    /// Configuration for every child hook.
    pub child_config: HookConfig,
    /// Configuration of the preparer hook, if one is wanted.
    pub preparer: Option<HookConfig>,
    /// Configuration of the fallback hook for unknown children.
    pub missing: Option<HookConfig>,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            selector: "name".to_owned(),
            raise_on_missing: true,
            raise_on_noname: true,
            child_config: HookConfig::default(),
            preparer: None,
            missing: None,
        }
    }
}

impl MultiplexerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset whose children are command hooks.
    #[must_use]
    pub fn commands() -> Self {
        Self::new().with_child_config(HookConfig::new().command())
    }

    /// Sets the selector key.
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    /// Sets whether unknown children are an error.
    #[must_use]
    pub fn raise_on_missing(mut self, raise: bool) -> Self {
        self.raise_on_missing = raise;
        self
    }

    /// Sets whether an absent selector is an error.
    #[must_use]
    pub fn raise_on_noname(mut self, raise: bool) -> Self {
        self.raise_on_noname = raise;
        self
    }

    /// Sets the child hook configuration.
    #[must_use]
    pub fn with_child_config(mut self, config: HookConfig) -> Self {
        self.child_config = config;
        self
    }

    /// Adds a preparer hook.
    #[must_use]
    pub fn with_preparer(mut self, config: HookConfig) -> Self {
        self.preparer = Some(config);
        self
    }

    /// Adds a fallback hook for unknown children.
    #[must_use]
    pub fn with_missing(mut self, config: HookConfig) -> Self {
        self.missing = Some(config);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookMultiplexer
// ─────────────────────────────────────────────────────────────────────────────

struct MultiplexerInner {
    name: String,
    config: MultiplexerConfig,
    preparer: Option<Hook>,
    missing: Option<Hook>,
    children: RwLock<IndexMap<String, Hook>>,
}

/// A router that fires one named child hook per firing.
///
/// # Example
///
/// ```
/// use roost_events::{Handler, RegisterOptions};
/// use roost_tree::{HookMultiplexer, MultiplexerConfig};
///
/// let commands = HookMultiplexer::new("commands", MultiplexerConfig::commands());
/// let ping = Handler::new("bot.commands.ping", |event| {
///     event.insert("reply", "pong");
///     Ok(())
/// });
/// // the child is named after the handler: "ping"
/// commands.register(None, &ping, RegisterOptions::new()).unwrap();
///
/// let event = commands.fire_with([[("name", "ping")]]).unwrap().unwrap();
/// assert_eq!(event.get_str("reply"), Some("pong"));
/// ```
#[derive(Clone)]
pub struct HookMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl HookMultiplexer {
    /// Creates a multiplexer.
    #[must_use]
    pub fn new(name: impl Into<String>, config: MultiplexerConfig) -> Self {
        let name = name.into();
        let preparer = config
            .preparer
            .clone()
            .map(|preparer| Hook::with_config(format!("{name}.preparer"), preparer));
        let missing = config
            .missing
            .clone()
            .map(|missing| Hook::with_config(format!("{name}.missing"), missing));

        Self {
            inner: Arc::new(MultiplexerInner {
                name,
                config,
                preparer,
                missing,
                children: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// The multiplexer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configuration the multiplexer was created with.
    #[must_use]
    pub fn config(&self) -> &MultiplexerConfig {
        &self.inner.config
    }

    /// The preparer hook, if configured.
    #[must_use]
    pub fn preparer(&self) -> Option<&Hook> {
        self.inner.preparer.as_ref()
    }

    /// The fallback hook for unknown children, if configured.
    #[must_use]
    pub fn missing(&self) -> Option<&Hook> {
        self.inner.missing.as_ref()
    }

    /// Returns the child hook called `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Hook> {
        self.inner.children.read().get(name).cloned()
    }

    /// Names of the current children, oldest first.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        self.inner.children.read().keys().cloned().collect()
    }

    /// Registers `handler` with the child called `name`.
    ///
    /// Without a name, the child is named after the last segment of the
    /// handler's qualified name. The child is created if needed.
    ///
    /// # Errors
    ///
    /// - [`HookError::NameResolution`] if no name is given and the handler is
    ///   anonymous.
    /// - Any error of [`Hook::register`].
    pub fn register(
        &self,
        name: Option<&str>,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, TreeError> {
        self.with_child(name, handler, |child| child.register(handler, options))
    }

    /// Registers `handler` with a child for a single call.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_once(
        &self,
        name: Option<&str>,
        handler: &Handler,
        options: RegisterOptions,
    ) -> Result<Handler, TreeError> {
        self.with_child(name, handler, |child| child.register_once(handler, options))
    }

    /// Removes `handler` from every child that holds it.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::NotRegistered`] if no child held it.
    pub fn unregister(&self, handler: &Handler) -> Result<(), TreeError> {
        let children: Vec<Hook> = self.inner.children.read().values().cloned().collect();
        let mut removed = 0;
        for child in children {
            match child.unregister(handler) {
                Ok(()) => removed += 1,
                Err(HookError::NotRegistered(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if removed == 0 {
            return Err(HookError::NotRegistered(format!(
                "no child of multiplexer '{}' holds {handler}",
                self.inner.name
            ))
            .into());
        }
        Ok(())
    }

    /// Routes a firing to the selected child.
    ///
    /// Returns the event of whichever hook ran last: the child, the `missing`
    /// hook, or the preparer when it cancelled or declined. Returns `None`
    /// when nothing ran because the child is unknown and neither a fallback
    /// nor an error is configured.
    ///
    /// # Errors
    ///
    /// - [`TreeError::MissingSelector`] if the selector is absent and
    ///   `raise_on_noname` is set.
    /// - [`TreeError::InvalidSelector`] if the selector holds a value other
    ///   than a string or `null`.
    /// - [`TreeError::NoSuchChild`] if no child matches, no `missing` hook
    ///   exists and `raise_on_missing` is set.
    /// - Any error of the hooks fired.
    pub fn fire_with<I, C>(&self, contexts: I) -> Result<Option<Event>, TreeError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Context>,
    {
        let selector = self.inner.config.selector.as_str();
        let mut context = Context::merged(contexts.into_iter().map(Into::into));
        let mut name = self.selected(context.get(selector))?;

        if name.is_none() && self.inner.config.raise_on_noname {
            return Err(TreeError::MissingSelector {
                multiplexer: self.inner.name.clone(),
                selector: selector.to_owned(),
            });
        }
        context.insert("multiplexer", self.inner.name.as_str());

        let mut prepared = None;
        if let Some(preparer) = &self.inner.preparer {
            let event = preparer.fire_with([context])?;
            if preparer.config().cancellable && event.is_cancelled() {
                return Ok(Some(event));
            }
            let Some(selected) = self.selected(event.get(selector))? else {
                debug!(multiplexer = %self.inner.name, "preparer declined routing");
                return Ok(Some(event));
            };
            name = Some(selected);
            context = event.clone().into_context();
            prepared = Some(event);
        }

        if let Some(child) = name.as_deref().and_then(|name| self.child(name)) {
            return Ok(Some(child.fire_with([context])?));
        }

        if let Some(missing) = &self.inner.missing {
            let requested = name.map_or(Value::Null, Value::from);
            context.insert("name", requested.clone());
            context.insert(selector, requested);
            return Ok(Some(missing.fire_with([context])?));
        }

        if self.inner.config.raise_on_missing {
            return Err(TreeError::NoSuchChild {
                multiplexer: self.inner.name.clone(),
                child: name.unwrap_or_default(),
            });
        }
        Ok(prepared)
    }

    /// Reads the child name out of a selector value; `null` counts as absent.
    fn selected(&self, value: Option<&Value>) -> Result<Option<String>, TreeError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(other) => Err(TreeError::InvalidSelector {
                multiplexer: self.inner.name.clone(),
                selector: self.inner.config.selector.clone(),
                value: other.to_string(),
            }),
        }
    }

    fn with_child(
        &self,
        name: Option<&str>,
        handler: &Handler,
        register: impl FnOnce(&Hook) -> Result<Handler, HookError>,
    ) -> Result<Handler, TreeError> {
        let name = match name.or_else(|| handler.short_name()) {
            Some(name) => name.to_owned(),
            None => {
                return Err(HookError::NameResolution(format!(
                    "cannot name a child of multiplexer '{}' after {handler}",
                    self.inner.name
                ))
                .into());
            }
        };

        let (child, created) = self.child_or_create(&name);
        match register(&child) {
            Ok(handler) => Ok(handler),
            Err(err) => {
                if created && child.handler_count() == 0 {
                    remove_child(&self.inner, &name, &child);
                }
                Err(err.into())
            }
        }
    }

    fn child_or_create(&self, name: &str) -> (Hook, bool) {
        if let Some(child) = self.child(name) {
            return (child, false);
        }

        let mut children = self.inner.children.write();
        if let Some(child) = children.get(name) {
            return (child.clone(), false);
        }

        let child = Hook::with_config(
            format!("{}[{name}]", self.inner.name),
            self.inner.config.child_config.clone(),
        );
        let owner: Weak<MultiplexerInner> = Arc::downgrade(&self.inner);
        let child_name = name.to_owned();
        child.on_emptied(move |hook| {
            if let Some(inner) = owner.upgrade() {
                remove_child(&inner, &child_name, hook);
            }
        });
        children.insert(name.to_owned(), child.clone());

        debug!(multiplexer = %self.inner.name, child = name, "created child hook");
        (child, true)
    }
}

fn remove_child(inner: &MultiplexerInner, name: &str, hook: &Hook) {
    let mut children = inner.children.write();
    if children.get(name).is_some_and(|child| child.ptr_eq(hook)) {
        children.shift_remove(name);
        debug!(multiplexer = %inner.name, child = name, "freed child hook");
    }
}

impl fmt::Debug for HookMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookMultiplexer")
            .field("name", &self.inner.name)
            .field("children", &self.child_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replying(name: &str, reply: &'static str) -> Handler {
        Handler::new(name, move |event| {
            event.insert("reply", reply);
            Ok(())
        })
    }

    #[test]
    fn routes_by_selector() {
        let mux = HookMultiplexer::new("mux", MultiplexerConfig::new());
        mux.register(Some("a"), &replying("h.a", "from a"), RegisterOptions::new())
            .unwrap();
        mux.register(Some("b"), &replying("h.b", "from b"), RegisterOptions::new())
            .unwrap();

        let event = mux.fire_with([[("name", "b")]]).unwrap().unwrap();
        assert_eq!(event.get_str("reply"), Some("from b"));
        assert_eq!(event.get_str("multiplexer"), Some("mux"));
        assert_eq!(mux.child("a").map(|h| h.name().to_owned()), Some("mux[a]".to_owned()));
    }

    #[test]
    fn missing_selector_is_an_error_by_default() {
        let mux = HookMultiplexer::new("strict", MultiplexerConfig::new());
        assert!(matches!(
            mux.fire_with(core::iter::empty::<Context>()),
            Err(TreeError::MissingSelector { .. })
        ));

        let lenient =
            HookMultiplexer::new("lenient", MultiplexerConfig::new().raise_on_noname(false).raise_on_missing(false));
        assert!(lenient.fire_with(core::iter::empty::<Context>()).unwrap().is_none());
    }

    #[test]
    fn non_string_selector_is_rejected() {
        let mux = HookMultiplexer::new("typed", MultiplexerConfig::new().raise_on_noname(false));
        mux.register(Some("7"), &replying("h.seven", "seven"), RegisterOptions::new())
            .unwrap();

        assert!(matches!(
            mux.fire_with([[("name", 7)]]),
            Err(TreeError::InvalidSelector { ref value, .. }) if value == "7"
        ));
        assert!(matches!(
            mux.fire_with([[("name", Value::Null)]]),
            Err(TreeError::NoSuchChild { .. })
        ));

        let prepared = HookMultiplexer::new("prepared", MultiplexerConfig::new().with_preparer(HookConfig::new()));
        let numbering = Handler::new("h.numbering", |event| {
            event.insert("name", 7);
            Ok(())
        });
        prepared
            .preparer()
            .unwrap()
            .register(&numbering, RegisterOptions::new())
            .unwrap();
        assert!(matches!(
            prepared.fire_with([[("name", "seven")]]),
            Err(TreeError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn unknown_child_raises_or_is_ignored() {
        let strict = HookMultiplexer::new("strict", MultiplexerConfig::new());
        assert!(matches!(
            strict.fire_with([[("name", "nope")]]),
            Err(TreeError::NoSuchChild { ref child, .. }) if child == "nope"
        ));

        let quiet = HookMultiplexer::new("quiet", MultiplexerConfig::new().raise_on_missing(false));
        assert!(quiet.fire_with([[("name", "nope")]]).unwrap().is_none());
    }

    #[test]
    fn anonymous_handler_needs_a_child_name() {
        let mux = HookMultiplexer::new("mux", MultiplexerConfig::new());
        let anonymous = Handler::anonymous(|_| Ok(()));
        assert!(matches!(
            mux.register(None, &anonymous, RegisterOptions::new()),
            Err(TreeError::Hook(HookError::NameResolution(_)))
        ));
        assert!(mux.child_names().is_empty());
    }

    #[test]
    fn failed_registration_does_not_leave_an_empty_child() {
        let mux = HookMultiplexer::new("mux", MultiplexerConfig::new());
        let handler = Handler::new("h.bad", |_| Ok(()));
        let result = mux.register(
            Some("bad"),
            &handler,
            RegisterOptions::tagged("t").after("x"),
        );
        assert!(result.is_err());
        assert!(mux.child("bad").is_none());
    }

    #[test]
    fn children_are_freed_when_emptied() {
        let mux = HookMultiplexer::new("mux", MultiplexerConfig::new());
        let handler = replying("h.herp", "herp");
        mux.register(None, &handler, RegisterOptions::new()).unwrap();
        assert_eq!(mux.child_names(), vec!["herp".to_owned()]);

        mux.unregister(&handler).unwrap();
        assert!(mux.child_names().is_empty());
        assert!(matches!(
            mux.unregister(&handler),
            Err(TreeError::Hook(HookError::NotRegistered(_)))
        ));
    }
}
