//! Topological ordering of dependency graphs.
//!
//! The graph maps every node to the set of nodes it must follow. Edges that
//! point at nodes which are not keys of the graph are treated as already
//! satisfied.

use core::fmt;
use core::hash::Hash;

use indexmap::{IndexMap, IndexSet};

/// A dependency graph: node → nodes it must come after.
pub type DependencyGraph<N> = IndexMap<N, IndexSet<N>>;

/// Raised when no total order satisfies every edge of the graph.
///
/// Carries the nodes that were still unordered when the sort stalled, in
/// graph iteration order. Every cycle of the input is contained in this set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicDependencyError<N> {
    /// Nodes left over once no further progress was possible.
    pub remaining: Vec<N>,
}

impl<N: fmt::Debug> fmt::Display for CyclicDependencyError<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unresolvable dependency loop among {} nodes: {:?}",
            self.remaining.len(),
            self.remaining
        )
    }
}

impl<N: fmt::Debug> core::error::Error for CyclicDependencyError<N> {}

/// Sorts `graph` so that every node comes after all of its edge targets.
///
/// Each round scans the remaining nodes in insertion order and moves every
/// node whose edge targets have all been moved out already. A node removed
/// earlier in the same round counts as moved, so one round can place a whole
/// chain that happens to be listed in order. Ties are broken by graph
/// iteration order, which makes the output deterministic for a given graph.
///
/// # Errors
///
/// Returns [`CyclicDependencyError`] when a full round moves no node.
///
/// # Example
///
/// ```
/// use indexmap::{IndexMap, IndexSet};
/// use roost_events::toposort::topological_sort;
///
/// let mut graph: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
/// graph.insert("late", IndexSet::from(["early"]));
/// graph.insert("early", IndexSet::new());
///
/// assert_eq!(topological_sort(&graph).unwrap(), vec!["early", "late"]);
/// ```
pub fn topological_sort<N>(graph: &DependencyGraph<N>) -> Result<Vec<N>, CyclicDependencyError<N>>
where
    N: Clone + Eq + Hash,
{
    let mut remaining: IndexMap<&N, &IndexSet<N>> = graph.iter().collect();
    let mut sorted = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut index = 0;

        while index < remaining.len() {
            let Some((_, edges)) = remaining.get_index(index) else {
                break;
            };
            let ready = edges.iter().all(|edge| !remaining.contains_key(&edge));

            if !ready {
                index += 1;
                continue;
            }
            if let Some((node, _)) = remaining.shift_remove_index(index) {
                sorted.push(node.clone());
                progressed = true;
            }
        }

        if !progressed {
            return Err(CyclicDependencyError {
                remaining: remaining.keys().map(|node| (*node).clone()).collect(),
            });
        }
    }

    Ok(sorted)
}
