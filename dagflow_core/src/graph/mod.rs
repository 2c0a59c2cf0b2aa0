//! Directed acyclic dependency graph.
//!
//! The graph keeps its vertices in insertion order and stores both forward
//! edges (`u -> v`: `v` depends on `u`) and reverse edges (the direct
//! dependencies of a vertex). Cycles are refused when an edge is added, so the
//! graph is acyclic at all times.
//!
//! The graph has no internal synchronization. Callers that share it between
//! tasks must serialize access themselves.
//!
//! # Examples
//!
//! ```
//! use dagflow_core::graph::Dag;
//!
//! let mut dag = Dag::new();
//! dag.add_edge("fetch", "validate").unwrap();
//! dag.add_edge("validate", "save").unwrap();
//!
//! // Closing the loop is refused and leaves the graph untouched
//! assert!(dag.add_edge("save", "fetch").is_err());
//! assert!(!dag.has_edge(&"save", &"fetch"));
//!
//! assert_eq!(dag.topo_sort(), vec!["fetch", "validate", "save"]);
//! ```

pub mod adjacency;

pub use adjacency::{AdjacencySet, HASH_MIRROR_THRESHOLD};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Returned by [`Dag::add_edge`] when the edge would close a cycle.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("edge {from:?} -> {to:?} would create a cycle")]
pub struct CycleError<V: Debug> {
    /// Source of the refused edge
    pub from: V,
    /// Target of the refused edge
    pub to: V,
}

/// Directed acyclic graph keyed by a comparable vertex identifier.
#[derive(Clone, Debug)]
pub struct Dag<V> {
    /// Vertices in insertion order
    vertices: Vec<V>,
    /// Membership index for `vertices`
    members: HashSet<V>,
    /// Direct dependents of each vertex
    forward: HashMap<V, AdjacencySet<V>>,
    /// Direct dependencies of each vertex
    reverse: HashMap<V, AdjacencySet<V>>,
}

impl<V> Dag<V>
where
    V: Clone + Eq + Hash + Debug,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            members: HashSet::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// Inserts `vertex` if it is not already present.
    ///
    /// Returns `true` if the vertex was new.
    pub fn add_vertex(&mut self, vertex: V) -> bool {
        if !self.members.insert(vertex.clone()) {
            return false;
        }
        self.vertices.push(vertex);
        true
    }

    /// Adds the edge `from -> to` (`to` depends on `from`).
    ///
    /// Missing endpoints are created. If the edge would close a cycle the
    /// graph is left untouched and [`CycleError`] is returned.
    pub fn add_edge(&mut self, from: V, to: V) -> Result<(), CycleError<V>> {
        if self.would_cycle(&from, &to) {
            tracing::trace!(?from, ?to, "refusing edge that closes a cycle");
            return Err(CycleError { from, to });
        }

        self.add_vertex(from.clone());
        self.add_vertex(to.clone());

        self.forward
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.reverse.entry(to).or_default().insert(from);

        Ok(())
    }

    /// Returns true if adding `from -> to` would create a cycle.
    ///
    /// A self-edge is always cyclic. Otherwise the reverse edges are walked
    /// breadth-first starting at `from`; reaching `to` means `from` already
    /// depends on `to`.
    pub fn would_cycle(&self, from: &V, to: &V) -> bool {
        if from == to {
            return true;
        }

        let mut visited: HashSet<&V> = HashSet::new();
        let mut queue: VecDeque<&V> = VecDeque::new();
        visited.insert(from);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            let Some(deps) = self.reverse.get(current) else {
                continue;
            };
            if deps.contains(to) {
                return true;
            }
            for dep in deps {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        false
    }

    /// Removes the edge `from -> to` if present.
    pub fn remove_edge(&mut self, from: &V, to: &V) -> bool {
        let removed = self
            .forward
            .get_mut(from)
            .map(|set| set.remove(to))
            .unwrap_or(false);

        if let Some(set) = self.reverse.get_mut(to) {
            set.remove(from);
        }

        removed
    }

    /// Removes `vertex` together with every edge touching it.
    pub fn remove_vertex(&mut self, vertex: &V) -> bool {
        if !self.members.remove(vertex) {
            return false;
        }
        self.vertices.retain(|v| v != vertex);

        if let Some(dependents) = self.forward.remove(vertex) {
            for dependent in &dependents {
                if let Some(set) = self.reverse.get_mut(dependent) {
                    set.remove(vertex);
                }
            }
        }
        if let Some(deps) = self.reverse.remove(vertex) {
            for dep in &deps {
                if let Some(set) = self.forward.get_mut(dep) {
                    set.remove(vertex);
                }
            }
        }

        true
    }

    pub fn contains(&self, vertex: &V) -> bool {
        self.members.contains(vertex)
    }

    pub fn has_edge(&self, from: &V, to: &V) -> bool {
        self.forward
            .get(from)
            .map(|set| set.contains(to))
            .unwrap_or(false)
    }

    /// Direct dependents of `vertex`, in edge insertion order.
    pub fn neighbors(&self, vertex: &V) -> &[V] {
        self.forward
            .get(vertex)
            .map(AdjacencySet::as_slice)
            .unwrap_or(&[])
    }

    /// Direct dependencies of `vertex`, in edge insertion order.
    pub fn reverse_neighbors(&self, vertex: &V) -> &[V] {
        self.reverse
            .get(vertex)
            .map(AdjacencySet::as_slice)
            .unwrap_or(&[])
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices without dependencies, in insertion order.
    pub fn zero_incoming(&self) -> Vec<V> {
        self.vertices
            .iter()
            .filter(|v| self.reverse_neighbors(v).is_empty())
            .cloned()
            .collect()
    }

    /// Returns the vertices in a stable topological order (Kahn's algorithm).
    ///
    /// The initial queue is seeded in vertex insertion order and neighbors
    /// are released in edge insertion order, so the same insertion history
    /// always yields the same sequence.
    ///
    /// # Panics
    ///
    /// Panics if the sort cannot emit every vertex. `add_edge` refuses cycles,
    /// so this indicates a broken graph invariant.
    pub fn topo_sort(&self) -> Vec<V> {
        let mut indegree: HashMap<&V, usize> =
            self.vertices.iter().map(|v| (v, 0)).collect();
        for deps in self.forward.values() {
            for dependent in deps {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count += 1;
                }
            }
        }

        let mut queue: VecDeque<&V> = self
            .vertices
            .iter()
            .filter(|v| indegree.get(v).copied() == Some(0))
            .collect();
        let mut order = Vec::with_capacity(self.vertices.len());

        while let Some(current) = queue.pop_front() {
            order.push(current.clone());
            for dependent in self.neighbors(current) {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        assert_eq!(
            order.len(),
            self.vertices.len(),
            "dependency graph contains a cycle; edge insertion guard was bypassed"
        );

        order
    }
}

impl<V> Default for Dag<V>
where
    V: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag<&'static str> {
        let mut dag = Dag::new();
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("a", "c").unwrap();
        dag.add_edge("b", "d").unwrap();
        dag.add_edge("c", "d").unwrap();
        dag
    }

    #[test]
    fn test_add_vertex_idempotent() {
        let mut dag = Dag::new();
        assert!(dag.add_vertex("a"));
        assert!(!dag.add_vertex("a"));
        assert!(dag.add_vertex("b"));

        assert_eq!(dag.vertices(), &["a", "b"]);
        assert_eq!(dag.len(), 2);
    }

    #[test]
    fn test_add_edge_creates_missing_vertices() {
        let mut dag = Dag::new();
        dag.add_edge("x", "y").unwrap();

        assert!(dag.contains(&"x"));
        assert!(dag.contains(&"y"));
        assert!(dag.has_edge(&"x", &"y"));
        assert!(!dag.has_edge(&"y", &"x"));
        assert_eq!(dag.reverse_neighbors(&"y"), &["x"]);
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut dag: Dag<&str> = Dag::new();
        let err = dag.add_edge("a", "a").unwrap_err();

        assert_eq!(err, CycleError { from: "a", to: "a" });
        assert!(dag.is_empty());
        assert!(!dag.has_edge(&"a", &"a"));
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let mut dag = Dag::new();
        dag.add_edge("a", "b").unwrap();
        dag.add_edge("b", "c").unwrap();

        assert!(dag.add_edge("c", "a").is_err());
        assert!(!dag.has_edge(&"c", &"a"));
        assert!(dag.neighbors(&"c").is_empty());
        assert_eq!(dag.reverse_neighbors(&"a"), &[] as &[&str]);
    }

    #[test]
    fn test_diamond_is_not_cyclic() {
        let dag = diamond();
        assert!(!dag.would_cycle(&"a", &"d"));
        assert!(dag.would_cycle(&"d", &"a"));
    }

    #[test]
    fn test_zero_incoming_in_insertion_order() {
        let mut dag = Dag::new();
        dag.add_vertex("z");
        dag.add_edge("m", "n").unwrap();
        dag.add_vertex("a");

        assert_eq!(dag.zero_incoming(), vec!["z", "m", "a"]);
    }

    #[test]
    fn test_topo_sort_diamond() {
        let dag = diamond();
        assert_eq!(dag.topo_sort(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_topo_sort_is_stable() {
        let dag = diamond();
        let first = dag.topo_sort();
        for _ in 0..10 {
            assert_eq!(dag.topo_sort(), first);
        }
    }

    #[test]
    fn test_remove_edge() {
        let mut dag = diamond();
        assert!(dag.remove_edge(&"a", &"b"));
        assert!(!dag.remove_edge(&"a", &"b"));

        assert!(!dag.has_edge(&"a", &"b"));
        assert_eq!(dag.reverse_neighbors(&"b"), &[] as &[&str]);
        assert_eq!(dag.zero_incoming(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_vertex() {
        let mut dag = diamond();
        assert!(dag.remove_vertex(&"b"));
        assert!(!dag.remove_vertex(&"b"));

        assert!(!dag.contains(&"b"));
        assert_eq!(dag.neighbors(&"a"), &["c"]);
        assert_eq!(dag.reverse_neighbors(&"d"), &["c"]);
        assert_eq!(dag.topo_sort(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_large_fan_out() {
        let mut dag = Dag::new();
        for i in 1..=200u32 {
            dag.add_edge(0, i).unwrap();
        }

        assert_eq!(dag.neighbors(&0).len(), 200);
        assert!(dag.has_edge(&0, &150));
        assert!(dag.add_edge(150, 0).is_err());
        assert_eq!(dag.topo_sort()[0], 0);
    }
}
