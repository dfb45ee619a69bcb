//! Dependency resolution and call-list construction.
//!
//! String references are resolved in this order:
//!
//! 1. relative to the requesting handler's name, one segment up
//!    (`pkg.mod.a` + `b` → `pkg.mod.b`)
//! 2. relative, two segments up (`pkg.b`)
//! 3. as an absolute name (`b`)
//! 4. as a tag name
//!
//! Steps 1-3 only run for single registrations and for references that do
//! not start with `:`. Tag lookups never create the tag.

use std::sync::Arc;

use tracing::debug;

use crate::dependency::DependencyRef;
use crate::error::HookError;
use crate::handler::Handler;
use crate::hook::HookState;
use crate::registration::{Node, NodeKey};
use crate::toposort::{DependencyGraph, topological_sort};

impl HookState {
    /// Sorts the graph, caches the flattened call list and returns it.
    pub(crate) fn rebuild(&mut self, hook: &str) -> Result<Arc<[Handler]>, HookError> {
        let graph = self.dependency_graph(hook)?;
        let sorted = topological_sort(&graph).map_err(|err| HookError::CyclicDependency {
            hook: hook.to_owned(),
            nodes: err.remaining.iter().map(|node| self.describe(node)).collect(),
        })?;

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for node in &sorted {
            match node {
                NodeKey::Single(id) => handlers.extend(self.handlers.get(id).cloned()),
                NodeKey::Tag(name) => {
                    if let Some(tag) = self.tags.get(name) {
                        handlers.extend(
                            tag.targets
                                .iter()
                                .filter_map(|id| self.handlers.get(id))
                                .cloned(),
                        );
                    }
                }
            }
        }

        let call_list: Arc<[Handler]> = handlers.into();
        debug!(
            hook,
            nodes = sorted.len(),
            handlers = call_list.len(),
            "rebuilt call list"
        );
        self.sorted_nodes = sorted;
        self.call_list = Some(Arc::clone(&call_list));
        Ok(call_list)
    }

    /// Builds node → nodes-it-runs-after over every populated node and every
    /// known tag.
    fn dependency_graph(&self, hook: &str) -> Result<DependencyGraph<NodeKey>, HookError> {
        let mut graph = DependencyGraph::new();
        for node in self
            .registration_groups
            .iter()
            .cloned()
            .chain(self.tags.keys().cloned().map(NodeKey::Tag))
        {
            graph.entry(node).or_default();
        }

        let nodes: Vec<NodeKey> = graph.keys().cloned().collect();
        for key in &nodes {
            let Some(node) = self.node(key) else {
                continue;
            };

            for dep in node.after() {
                if let Some(target) = self.resolve(hook, key, dep)?
                    && let Some(edges) = graph.get_mut(key)
                {
                    edges.insert(target);
                }
            }
            for dep in node.before() {
                if let Some(target) = self.resolve(hook, key, dep)?
                    && let Some(edges) = graph.get_mut(&target)
                {
                    edges.insert(key.clone());
                }
            }
        }

        Ok(graph)
    }

    fn node(&self, key: &NodeKey) -> Option<Node<'_>> {
        match key {
            NodeKey::Single(id) => self.registrations.get(id).map(Node::Single),
            NodeKey::Tag(name) => self.tags.get(name).map(Node::Tag),
        }
    }

    /// Resolves one reference declared by `requesting`.
    ///
    /// Returns `None` for a directly referenced tag that no longer exists;
    /// such an edge constrains nothing.
    fn resolve(
        &self,
        hook: &str,
        requesting: &NodeKey,
        dep: &DependencyRef,
    ) -> Result<Option<NodeKey>, HookError> {
        match dep {
            DependencyRef::Handler(id) => self
                .references
                .get(id)
                .and_then(|canonical| self.handler_references.get(canonical))
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    HookError::NameResolution(format!(
                        "{dep} referenced by {} is not registered to hook '{hook}'",
                        self.describe(requesting)
                    ))
                }),
            DependencyRef::Tag(name) => {
                Ok(self.tags.contains_key(name).then(|| NodeKey::Tag(name.clone())))
            }
            DependencyRef::Name(name) => self.lookup_name(hook, requesting, name).map(Some),
        }
    }

    fn lookup_name(
        &self,
        hook: &str,
        requesting: &NodeKey,
        name: &str,
    ) -> Result<NodeKey, HookError> {
        if let NodeKey::Single(id) = requesting
            && !name.starts_with(':')
        {
            if let Some(own_name) = self.handlers.get(id).and_then(Handler::name) {
                let segments: Vec<&str> = own_name.split('.').collect();
                for steps_up in [1, 2] {
                    let keep = segments.len().saturating_sub(steps_up);
                    let candidate = segments[..keep]
                        .iter()
                        .copied()
                        .chain(name.split('.'))
                        .collect::<Vec<_>>()
                        .join(".");
                    if let Some(found) = self.reference_names.get(&candidate) {
                        return Ok(found.clone());
                    }
                }
            }

            if let Some(found) = self.reference_names.get(name) {
                return Ok(found.clone());
            }
        }

        let tag = name.strip_prefix(':').unwrap_or(name);
        if self.tags.contains_key(tag) {
            return Ok(NodeKey::Tag(tag.to_owned()));
        }

        Err(HookError::DependencyMissing {
            hook: hook.to_owned(),
            dependency: name.to_owned(),
            node: self.describe(requesting),
        })
    }

    /// Human-readable name of a node for diagnostics.
    pub(crate) fn describe(&self, node: &NodeKey) -> String {
        match node {
            NodeKey::Single(id) => self
                .handlers
                .get(id)
                .map_or_else(|| id.to_string(), ToString::to_string),
            NodeKey::Tag(name) => format!(":{name}"),
        }
    }
}
