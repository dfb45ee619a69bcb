//! Ordering references and registration options.

use core::fmt;

use variadics_please::all_tuples;

use crate::handler::{Handler, HandlerId};

/// Something a registration can be ordered before or after.
///
/// - [`Handler`](DependencyRef::Handler): a handler registered to the same
///   hook, referenced directly.
/// - [`Name`](DependencyRef::Name): a dotted name, resolved relative to the
///   registering handler's name first (one, then two segments up), then as an
///   absolute name, then as a tag. A leading `:` skips straight to the tag
///   lookup.
/// - [`Tag`](DependencyRef::Tag): a tag group, referenced directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    /// A handler, by identity.
    Handler(HandlerId),
    /// A handler or tag, by name.
    Name(String),
    /// A tag group.
    Tag(String),
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRef::Handler(id) => write!(f, "handler {id}"),
            DependencyRef::Name(name) => f.write_str(name),
            DependencyRef::Tag(tag) => write!(f, "tag '{tag}'"),
        }
    }
}

impl From<&str> for DependencyRef {
    fn from(name: &str) -> Self {
        DependencyRef::Name(name.to_owned())
    }
}

impl From<String> for DependencyRef {
    fn from(name: String) -> Self {
        DependencyRef::Name(name)
    }
}

impl From<&Handler> for DependencyRef {
    fn from(handler: &Handler) -> Self {
        DependencyRef::Handler(handler.id())
    }
}

impl From<HandlerId> for DependencyRef {
    fn from(id: HandlerId) -> Self {
        DependencyRef::Handler(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IntoDependencies
// ─────────────────────────────────────────────────────────────────────────────

/// Conversion into a list of ordering references.
///
/// Implemented for single references, vectors, arrays, and tuples of up to 12
/// mixed references, so call sites can write
/// `.after(("pkg.mod.setup", &other_handler, ":late"))`.
pub trait IntoDependencies {
    /// Returns the references in declaration order.
    fn into_dependencies(self) -> Vec<DependencyRef>;
}

impl IntoDependencies for () {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        Vec::new()
    }
}

impl IntoDependencies for DependencyRef {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        vec![self]
    }
}

impl IntoDependencies for &str {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        vec![self.into()]
    }
}

impl IntoDependencies for String {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        vec![self.into()]
    }
}

impl IntoDependencies for &Handler {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        vec![self.into()]
    }
}

impl IntoDependencies for HandlerId {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        vec![self.into()]
    }
}

impl<T: Into<DependencyRef>> IntoDependencies for Vec<T> {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<DependencyRef>, const N: usize> IntoDependencies for [T; N] {
    fn into_dependencies(self) -> Vec<DependencyRef> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! impl_into_dependencies_for_tuple {
    ($($D:ident),*) => {
        impl<$($D: Into<DependencyRef>),*> IntoDependencies for ($($D,)*) {
            #[expect(non_snake_case, reason = "tuple fields reuse the type parameter names")]
            fn into_dependencies(self) -> Vec<DependencyRef> {
                let ($($D,)*) = self;
                vec![$($D.into()),*]
            }
        }
    };
}

// Generate implementations for tuples from 2 to 12 elements
all_tuples!(impl_into_dependencies_for_tuple, 2, 12, D);

// ─────────────────────────────────────────────────────────────────────────────
// RegisterOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Ordering options for a registration.
///
/// A registration is either tagged or explicitly ordered, never both:
/// registering with a tag and any `before`/`after` reference fails with
/// [`HookError::InvalidOrderRequirements`](crate::HookError::InvalidOrderRequirements).
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub(crate) before: Vec<DependencyRef>,
    pub(crate) after: Vec<DependencyRef>,
    pub(crate) tag: Option<String>,
}

impl RegisterOptions {
    /// Options with no ordering at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that place the handler in `tag`.
    #[must_use]
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::new().tag(tag)
    }

    /// Adds references the handler must run before.
    #[must_use]
    pub fn before(mut self, deps: impl IntoDependencies) -> Self {
        self.before.extend(deps.into_dependencies());
        self
    }

    /// Adds references the handler must run after.
    #[must_use]
    pub fn after(mut self, deps: impl IntoDependencies) -> Self {
        self.after.extend(deps.into_dependencies());
        self
    }

    /// Places the handler in a tag group.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Returns true if any before/after reference was given.
    #[must_use]
    pub fn has_ordering(&self) -> bool {
        !self.before.is_empty() || !self.after.is_empty()
    }

    /// The tag, if any.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}
