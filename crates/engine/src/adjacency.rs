//! Paired adjacency maps.
//!
//! The graph keeps three relations (formula <-> vector, formula <-> scalar
//! input, vector <-> covered cell), each of which must be queryable in both
//! directions. `Adjacency` bundles a forward map with its inverse so an edge
//! can never exist in one direction only.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// A forward map `L -> set<R>` paired with its inverse `R -> set<L>`.
///
/// Invariants:
/// - `(l, r)` is in the forward map iff `(r, l)` is in the inverse map.
/// - The inverse map never holds an empty set.
/// - The forward map MAY hold a registered-but-empty left (a formula with no
///   edges of this kind still gets a row via [`Adjacency::ensure_left`]).
#[derive(Clone, Debug, Default)]
pub struct Adjacency<L, R>
where
    L: Clone + Eq + Hash,
    R: Clone + Eq + Hash,
{
    forward: FxHashMap<L, FxHashSet<R>>,
    inverse: FxHashMap<R, FxHashSet<L>>,
}

impl<L, R> Adjacency<L, R>
where
    L: Clone + Eq + Hash,
    R: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            forward: FxHashMap::default(),
            inverse: FxHashMap::default(),
        }
    }

    /// Insert the edge `(left, right)` into both directions.
    pub fn insert(&mut self, left: L, right: R) {
        self.forward
            .entry(left.clone())
            .or_default()
            .insert(right.clone());
        self.inverse.entry(right).or_default().insert(left);
    }

    /// Remove the edge `(left, right)` from both directions.
    ///
    /// The left's (possibly now empty) forward bucket is retained; the
    /// right's inverse bucket is dropped when it empties.
    pub fn remove(&mut self, left: &L, right: &R) {
        if let Some(rights) = self.forward.get_mut(left) {
            rights.remove(right);
        }
        if let Some(lefts) = self.inverse.get_mut(right) {
            lefts.remove(left);
            if lefts.is_empty() {
                self.inverse.remove(right);
            }
        }
    }

    /// Register `left` with an empty edge set if it has none yet.
    pub fn ensure_left(&mut self, left: L) {
        self.forward.entry(left).or_default();
    }

    /// Forward edge set of `left`.
    pub fn left(&self, left: &L) -> Option<&FxHashSet<R>> {
        self.forward.get(left)
    }

    /// Inverse edge set of `right`.
    pub fn right(&self, right: &R) -> Option<&FxHashSet<L>> {
        self.inverse.get(right)
    }

    pub fn contains_left(&self, left: &L) -> bool {
        self.forward.contains_key(left)
    }

    pub fn contains_right(&self, right: &R) -> bool {
        self.inverse.contains_key(right)
    }

    pub fn lefts(&self) -> impl Iterator<Item = &L> {
        self.forward.keys()
    }

    pub fn rights(&self) -> impl Iterator<Item = &R> {
        self.inverse.keys()
    }

    /// Iterate every `(left, right)` edge.
    pub fn iter_edges(&self) -> impl Iterator<Item = (&L, &R)> {
        self.forward
            .iter()
            .flat_map(|(l, rights)| rights.iter().map(move |r| (l, r)))
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.inverse.clear();
    }

    /// Verify the two directions mirror each other. Test-only.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (l, rights) in &self.forward {
            for r in rights {
                assert!(
                    self.inverse.get(r).is_some_and(|ls| ls.contains(l)),
                    "forward edge missing from inverse map"
                );
            }
        }
        for (r, lefts) in &self.inverse {
            assert!(!lefts.is_empty(), "inverse map holds an empty set");
            for l in lefts {
                assert!(
                    self.forward.get(l).is_some_and(|rs| rs.contains(r)),
                    "inverse edge missing from forward map"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_bidirectional() {
        let mut adj: Adjacency<&str, u32> = Adjacency::new();
        adj.insert("f", 1);
        adj.insert("f", 2);
        adj.insert("g", 1);

        assert_eq!(adj.left(&"f").unwrap().len(), 2);
        assert_eq!(adj.right(&1).unwrap().len(), 2);
        assert_eq!(adj.right(&2).unwrap().len(), 1);
        adj.assert_consistent();
    }

    #[test]
    fn test_remove_cleans_inverse_but_keeps_forward_bucket() {
        let mut adj: Adjacency<&str, u32> = Adjacency::new();
        adj.insert("f", 1);
        adj.remove(&"f", &1);

        assert!(adj.contains_left(&"f"));
        assert!(adj.left(&"f").unwrap().is_empty());
        assert!(!adj.contains_right(&1));
        adj.assert_consistent();
    }

    #[test]
    fn test_remove_missing_edge_is_noop() {
        let mut adj: Adjacency<&str, u32> = Adjacency::new();
        adj.insert("f", 1);
        adj.remove(&"f", &2);
        adj.remove(&"g", &1);

        assert!(adj.left(&"f").unwrap().contains(&1));
        assert!(adj.right(&1).unwrap().contains(&"f"));
        adj.assert_consistent();
    }

    #[test]
    fn test_ensure_left_registers_empty_row() {
        let mut adj: Adjacency<&str, u32> = Adjacency::new();
        adj.ensure_left("f");

        assert!(adj.contains_left(&"f"));
        assert!(adj.left(&"f").unwrap().is_empty());
        // ensure_left after insert must not wipe existing edges
        adj.insert("f", 1);
        adj.ensure_left("f");
        assert_eq!(adj.left(&"f").unwrap().len(), 1);
        adj.assert_consistent();
    }

    #[test]
    fn test_iter_edges() {
        let mut adj: Adjacency<&str, u32> = Adjacency::new();
        adj.insert("f", 1);
        adj.insert("f", 2);
        adj.insert("g", 2);

        let mut edges: Vec<(&str, u32)> = adj.iter_edges().map(|(l, r)| (*l, *r)).collect();
        edges.sort();
        assert_eq!(edges, vec![("f", 1), ("f", 2), ("g", 2)]);
    }
}
