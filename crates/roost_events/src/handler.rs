//! Handler values registered against hooks.
//!
//! A [`Handler`] bundles a shared callable with a process-unique
//! [`HandlerId`] and an optional fully-qualified name. The name is data the
//! collaborator supplies (`"pkg.module.function"`); it is what string
//! dependencies resolve against.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::Event;

/// Error type returned by failing handlers.
pub type HandlerError = Box<dyn core::error::Error + Send + Sync>;

/// Result type returned by handlers.
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn = dyn Fn(&mut Event) -> HandlerResult + Send + Sync;

// ─────────────────────────────────────────────────────────────────────────────
// HandlerId
// ─────────────────────────────────────────────────────────────────────────────

/// Process-unique identity of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference
// ─────────────────────────────────────────────────────────────────────────────

/// One identity a handler is known by inside a hook.
///
/// Plain handlers have exactly one reference: themselves. Proxies present the
/// references of the handlers they stand in for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    id: HandlerId,
    name: Option<Arc<str>>,
}

impl Reference {
    /// The referenced handler id.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The fully-qualified name, if the collaborator supplied one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "<anonymous {}>", self.id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// A callable registered against a hook.
///
/// Cloning a handler is cheap and keeps its identity: every clone refers to
/// the same registration.
///
/// # Example
///
/// ```
/// use roost_events::{Handler, Hook, RegisterOptions};
///
/// let hook = Hook::new("startup");
/// let greet = Handler::new("app.greeter.greet", |event| {
///     event.insert("greeted", true);
///     Ok(())
/// });
/// hook.register(&greet, RegisterOptions::new()).unwrap();
///
/// let event = hook.fire().unwrap();
/// assert_eq!(event.get_bool("greeted"), Some(true));
/// ```
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    name: Option<Arc<str>>,
    aliases: Arc<[Reference]>,
    func: Arc<HandlerFn>,
}

impl Handler {
    /// Creates a handler with a fully-qualified name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: HandlerId::new(),
            name: Some(Arc::from(name.into())),
            aliases: Arc::from([]),
            func: Arc::new(func),
        }
    }

    /// Creates a handler without a name.
    ///
    /// Anonymous handlers can only be referenced directly, never by string.
    #[must_use]
    pub fn anonymous(func: impl Fn(&mut Event) -> HandlerResult + Send + Sync + 'static) -> Self {
        Self {
            id: HandlerId::new(),
            name: None,
            aliases: Arc::from([]),
            func: Arc::new(func),
        }
    }

    /// Makes this handler stand in for `references` inside a hook.
    ///
    /// The hook then records the given references instead of this handler's
    /// own, so registering or unregistering any of the originals collides with
    /// the proxy.
    #[must_use]
    pub fn proxy_for(mut self, references: impl IntoIterator<Item = Reference>) -> Self {
        self.aliases = references.into_iter().collect();
        self
    }

    /// The handler's identity.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The fully-qualified name, if one was supplied.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The last dotted segment of the name.
    #[must_use]
    pub fn short_name(&self) -> Option<&str> {
        self.name().and_then(|name| name.rsplit('.').next())
    }

    /// This handler as a single reference.
    #[must_use]
    pub fn reference(&self) -> Reference {
        Reference {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Every reference the handler is known by inside a hook.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        if self.aliases.is_empty() {
            vec![self.reference()]
        } else {
            self.aliases.to_vec()
        }
    }

    /// Creates a new handler that stands in for this one.
    ///
    /// The wrapper gets a fresh id but keeps this handler's name and
    /// references, so unregistering the original removes the wrapper.
    pub(crate) fn wrap(
        &self,
        func: impl Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: HandlerId::new(),
            name: self.name.clone(),
            aliases: self.references().into(),
            func: Arc::new(func),
        }
    }

    /// Invokes the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever error the wrapped callable returns.
    pub fn call(&self, event: &mut Event) -> HandlerResult {
        (self.func)(event)
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reference(), f)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = HandlerId::new();
        let b = HandlerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn clones_share_identity() {
        let handler = Handler::new("pkg.mod.f", |_| Ok(()));
        let copy = handler.clone();
        assert_eq!(handler, copy);
        assert_eq!(handler.id(), copy.id());
    }

    #[test]
    fn short_name_is_last_segment() {
        let handler = Handler::new("pkg.mod.herp", |_| Ok(()));
        assert_eq!(handler.short_name(), Some("herp"));

        let flat = Handler::new("derp", |_| Ok(()));
        assert_eq!(flat.short_name(), Some("derp"));

        assert_eq!(Handler::anonymous(|_| Ok(())).short_name(), None);
    }

    #[test]
    fn plain_handler_references_itself() {
        let handler = Handler::new("a.b", |_| Ok(()));
        let refs = handler.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id(), handler.id());
        assert_eq!(refs[0].name(), Some("a.b"));
    }

    #[test]
    fn proxy_presents_original_references() {
        let first = Handler::new("a.first", |_| Ok(()));
        let second = Handler::anonymous(|_| Ok(()));
        let proxy = Handler::anonymous(|_| Ok(()))
            .proxy_for([first.reference(), second.reference()]);

        let ids: Vec<_> = proxy.references().iter().map(Reference::id).collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
        assert_ne!(proxy.id(), first.id());
    }

    #[test]
    fn display_falls_back_to_id() {
        let handler = Handler::anonymous(|_| Ok(()));
        assert!(handler.to_string().starts_with("<anonymous #"));
        assert_eq!(Handler::new("x.y", |_| Ok(())).to_string(), "x.y");
    }

    #[test]
    fn call_forwards_errors() {
        let handler = Handler::anonymous(|_| Err("boom".into()));
        let mut event = Event::default();
        let err = handler.call(&mut event).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
