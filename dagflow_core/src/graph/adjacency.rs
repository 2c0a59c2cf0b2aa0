//! Ordered adjacency sets for the dependency graph.
//!
//! Neighbor lists are kept as a plain `Vec` so iteration follows edge
//! insertion order. Small sets answer membership with a linear scan; once a
//! set grows past [`HASH_MIRROR_THRESHOLD`] a `HashSet` mirror is built next to
//! the list so lookups stay cheap for vertices with a large fan-out.

use std::collections::HashSet;
use std::hash::Hash;

/// Number of elements above which a hash mirror is maintained.
pub const HASH_MIRROR_THRESHOLD: usize = 64;

/// Insertion-ordered set of neighbor vertices.
#[derive(Clone, Debug)]
pub struct AdjacencySet<V> {
    items: Vec<V>,
    mirror: Option<HashSet<V>>,
}

impl<V> AdjacencySet<V>
where
    V: Clone + Eq + Hash,
{
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            mirror: None,
        }
    }

    /// Returns true if `value` is in the set.
    pub fn contains(&self, value: &V) -> bool {
        match &self.mirror {
            Some(mirror) => mirror.contains(value),
            None => self.items.iter().any(|item| item == value),
        }
    }

    /// Appends `value` unless it is already present.
    ///
    /// Returns `true` if the set changed.
    pub fn insert(&mut self, value: V) -> bool {
        if self.contains(&value) {
            return false;
        }

        if let Some(mirror) = self.mirror.as_mut() {
            mirror.insert(value.clone());
        }
        self.items.push(value);

        if self.mirror.is_none() && self.items.len() > HASH_MIRROR_THRESHOLD {
            self.mirror = Some(self.items.iter().cloned().collect());
        }

        true
    }

    /// Removes `value`, keeping the order of the remaining elements.
    ///
    /// Returns `true` if the value was present.
    pub fn remove(&mut self, value: &V) -> bool {
        let Some(pos) = self.items.iter().position(|item| item == value) else {
            return false;
        };
        self.items.remove(pos);

        if self.items.len() <= HASH_MIRROR_THRESHOLD {
            self.mirror = None;
        } else if let Some(mirror) = self.mirror.as_mut() {
            mirror.remove(value);
        }

        true
    }

    /// Elements in insertion order.
    pub fn as_slice(&self) -> &[V] {
        &self.items
    }

    /// Iterates the elements in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the hash mirror is currently built.
    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }
}

impl<V> Default for AdjacencySet<V>
where
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, V> IntoIterator for &'a AdjacencySet<V> {
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
