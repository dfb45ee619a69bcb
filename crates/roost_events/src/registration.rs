//! Registration containers: the nodes of a hook's dependency graph.

use core::fmt;

use indexmap::IndexSet;

use crate::dependency::DependencyRef;
use crate::handler::HandlerId;

/// Key of one node in a hook's dependency graph.
///
/// Single registrations are keyed by the canonical id of their handler, tag
/// groups by their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// A single handler with its own ordering.
    Single(HandlerId),
    /// A tag group.
    Tag(String),
}

impl NodeKey {
    /// Returns true for tag group nodes.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        matches!(self, NodeKey::Tag(_))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Single(id) => write!(f, "handler {id}"),
            NodeKey::Tag(name) => write!(f, "tag '{name}'"),
        }
    }
}

/// One handler registered with explicit ordering.
#[derive(Debug, Clone)]
pub(crate) struct SingleRegistration {
    pub(crate) handler: HandlerId,
    pub(crate) before: Vec<DependencyRef>,
    pub(crate) after: Vec<DependencyRef>,
}

/// A named bucket of handlers sharing one set of ordering constraints.
///
/// Tags are created on first reference. A tag whose ordering was never
/// declared is deleted once its last member leaves.
#[derive(Debug, Clone)]
pub(crate) struct TagGroup {
    pub(crate) name: String,
    pub(crate) targets: IndexSet<HandlerId>,
    pub(crate) before: Vec<DependencyRef>,
    pub(crate) after: Vec<DependencyRef>,
    pub(crate) deletable: bool,
}

impl TagGroup {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: IndexSet::new(),
            before: Vec::new(),
            after: Vec::new(),
            deletable: true,
        }
    }

    /// Replaces the tag's ordering and pins it against garbage collection.
    pub(crate) fn dependencies(&mut self, before: Vec<DependencyRef>, after: Vec<DependencyRef>) {
        self.before = before;
        self.after = after;
        self.deletable = false;
    }

    /// Returns true if the tag should be dropped from the tag table.
    pub(crate) fn is_collectable(&self) -> bool {
        self.deletable && self.targets.is_empty()
    }
}

/// Borrowed view of a graph node, dispatched by kind.
pub(crate) enum Node<'a> {
    Single(&'a SingleRegistration),
    Tag(&'a TagGroup),
}

impl Node<'_> {
    pub(crate) fn before(&self) -> &[DependencyRef] {
        match self {
            Node::Single(single) => &single.before,
            Node::Tag(tag) => &tag.before,
        }
    }

    pub(crate) fn after(&self) -> &[DependencyRef] {
        match self {
            Node::Single(single) => &single.after,
            Node::Tag(tag) => &tag.after,
        }
    }
}
