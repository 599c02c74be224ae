//! Simple-path distance matrices.
//!
//! For every (formula, input) pair the graph records the set of *all*
//! distinct simple-path lengths between them, not just the shortest. A cell
//! two hops away through one chain and three hops through another gets
//! `{2, 3}`. The matrix is sparse; absent pairs are unreachable.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::addr::Address;
use crate::graph::DepGraph;
use crate::progress::Progress;

/// Sparse matrix of simple-path length sets between cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistanceMatrix {
    matrix: FxHashMap<Address, FxHashMap<Address, FxHashSet<u32>>>,
}

impl DistanceMatrix {
    pub fn new() -> Self {
        Self {
            matrix: FxHashMap::default(),
        }
    }

    /// Record one simple path of length `len` from `from` to `to`.
    pub fn connect(&mut self, from: Address, to: Address, len: u32) {
        self.matrix
            .entry(from)
            .or_default()
            .entry(to)
            .or_default()
            .insert(len);
    }

    /// All recorded path lengths between a pair; empty if unreachable.
    pub fn distances(&self, from: &Address, to: &Address) -> FxHashSet<u32> {
        self.matrix
            .get(from)
            .and_then(|row| row.get(to))
            .cloned()
            .unwrap_or_default()
    }

    /// Full row for `from`: every reachable cell with its length set.
    pub fn all_from(&self, from: &Address) -> Option<&FxHashMap<Address, FxHashSet<u32>>> {
        self.matrix.get(from)
    }

    /// The reversed matrix: `transpose()[to][from] == self[from][to]`.
    pub fn transpose(&self) -> DistanceMatrix {
        let mut out = DistanceMatrix::new();
        for (from, row) in &self.matrix {
            for (to, lengths) in row {
                for len in lengths {
                    out.connect(to.clone(), from.clone(), *len);
                }
            }
        }
        out
    }

    /// Iterate every `(from, to, lengths)` entry.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Address, &FxHashSet<u32>)> {
        self.matrix
            .iter()
            .flat_map(|(from, row)| row.iter().map(move |(to, lens)| (from, to, lens)))
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

enum Step {
    Enter(Address),
    Leave(Address),
}

/// Compute the forward distance matrix: for every node reachable from a
/// terminal formula, the set of simple-path lengths from each of its
/// transitive dependent formulas down to it.
///
/// Traversal starts at the terminal formulas; in an acyclic graph every
/// formula lies below some terminal, so this covers all dependent pairs.
/// Every visited node also gets the self-distance `{0}`. Nodes already on
/// the current path are skipped, which keeps paths simple and makes the
/// traversal terminate even on cyclic input. Formulas not reachable from
/// any terminal (a pure cycle has no terminals at all) are never visited
/// and get no row, not even the self-distance; use
/// [`crate::graph::DepGraph::contains_loop`] to detect that case.
pub fn all_simple_paths(graph: &DepGraph, progress: &Progress) -> DistanceMatrix {
    let mut matrix = DistanceMatrix::new();

    for terminal in graph.terminal_formulas() {
        if progress.is_cancelled() {
            break;
        }

        // Ancestor stack of the current DFS path, outermost first.
        let mut ancestors: Vec<Address> = Vec::new();
        let mut on_path: FxHashSet<Address> = FxHashSet::default();
        let mut stack: Vec<Step> = vec![Step::Enter(terminal)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => {
                    if on_path.contains(&node) {
                        continue;
                    }
                    matrix.connect(node.clone(), node.clone(), 0);
                    if !graph.is_formula(&node) {
                        continue;
                    }

                    stack.push(Step::Leave(node.clone()));
                    on_path.insert(node.clone());
                    ancestors.push(node.clone());

                    for input in graph.direct_inputs(&node) {
                        if on_path.contains(&input) {
                            continue;
                        }
                        // Each ancestor at depth d above the current node
                        // reaches this input along a simple path of d + 1.
                        for (depth, ancestor) in ancestors.iter().rev().enumerate() {
                            matrix.connect(
                                ancestor.clone(),
                                input.clone(),
                                (depth + 1) as u32,
                            );
                        }
                        stack.push(Step::Enter(input));
                    }
                }
                Step::Leave(node) => {
                    ancestors.pop();
                    on_path.remove(&node);
                }
            }
        }
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::AddressMode;

    fn addr(row: u32, col: u32) -> Address {
        Address::new("dir", "book.xlsx", "Sheet1", row, col, AddressMode::Absolute)
    }

    fn lens(v: &[u32]) -> FxHashSet<u32> {
        v.iter().copied().collect()
    }

    /// Chain graph: C1 = B1, B1 = A1, A1 raw.
    fn chain_graph() -> DepGraph {
        let mut g = DepGraph::new("dir".into(), "book.xlsx".into(), vec!["Sheet1".into()]);
        let a1 = addr(1, 1);
        let b1 = addr(1, 2);
        let c1 = addr(1, 3);
        g.formulas.insert(b1.clone(), "=A1".into());
        g.formulas.insert(c1.clone(), "=B1".into());
        for f in [&b1, &c1] {
            g.f2v.ensure_left(f.clone());
            g.f2i.ensure_left(f.clone());
        }
        g.values.insert(a1.clone(), crate::value::RawValue::Number(1.0));
        g.f2i.insert(b1.clone(), a1);
        g.f2i.insert(c1, b1);
        g
    }

    #[test]
    fn test_connect_accumulates_lengths() {
        let mut m = DistanceMatrix::new();
        m.connect(addr(1, 1), addr(2, 2), 2);
        m.connect(addr(1, 1), addr(2, 2), 3);
        m.connect(addr(1, 1), addr(2, 2), 2);
        assert_eq!(m.distances(&addr(1, 1), &addr(2, 2)), lens(&[2, 3]));
    }

    #[test]
    fn test_unreachable_pair_is_empty() {
        let m = DistanceMatrix::new();
        assert!(m.distances(&addr(1, 1), &addr(2, 2)).is_empty());
    }

    #[test]
    fn test_transpose() {
        let mut m = DistanceMatrix::new();
        m.connect(addr(1, 1), addr(2, 2), 1);
        m.connect(addr(1, 1), addr(2, 2), 4);
        m.connect(addr(3, 3), addr(2, 2), 2);

        let t = m.transpose();
        assert_eq!(t.distances(&addr(2, 2), &addr(1, 1)), lens(&[1, 4]));
        assert_eq!(t.distances(&addr(2, 2), &addr(3, 3)), lens(&[2]));
        assert!(t.distances(&addr(1, 1), &addr(2, 2)).is_empty());
        // Transposing twice gets back the original.
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn test_chain_distances() {
        let g = chain_graph();
        let m = all_simple_paths(&g, &Progress::noop());

        let a1 = addr(1, 1);
        let b1 = addr(1, 2);
        let c1 = addr(1, 3);
        assert_eq!(m.distances(&c1, &b1), lens(&[1]));
        assert_eq!(m.distances(&c1, &a1), lens(&[2]));
        assert_eq!(m.distances(&b1, &a1), lens(&[1]));
        // Every visited node knows itself at distance zero.
        for node in [&a1, &b1, &c1] {
            assert_eq!(m.distances(node, node), lens(&[0]));
        }
        // No entry upward.
        assert!(m.distances(&a1, &c1).is_empty());
    }

    /// Diamond-with-shortcut: multiple simple paths of different lengths
    /// between the same pair must all be recorded.
    ///
    ///   A1 raw; B1,C1,D1,E1 = A1; F1 = B1+C1; G1 = C1+D1; H1 = B1+D1;
    ///   I1 = G1+H1+D1; J1 = E1+I1. Sinks: F1, J1.
    #[test]
    fn test_diamond_distances() {
        let mut g = DepGraph::new("dir".into(), "book.xlsx".into(), vec!["Sheet1".into()]);
        let a1 = addr(1, 1);
        let cells: Vec<Address> = (1..=10).map(|col| addr(1, col)).collect();
        let (b1, c1, d1, e1) = (&cells[1], &cells[2], &cells[3], &cells[4]);
        let (f1, g1, h1, i1, j1) = (&cells[5], &cells[6], &cells[7], &cells[8], &cells[9]);

        g.values.insert(a1.clone(), crate::value::RawValue::Number(1.0));
        let edges: Vec<(&Address, &str, Vec<&Address>)> = vec![
            (b1, "=A1", vec![&a1]),
            (c1, "=A1", vec![&a1]),
            (d1, "=A1", vec![&a1]),
            (e1, "=A1", vec![&a1]),
            (f1, "=B1+C1", vec![b1, c1]),
            (g1, "=C1+D1", vec![c1, d1]),
            (h1, "=B1+D1", vec![b1, d1]),
            (i1, "=G1+H1+D1", vec![g1, h1, d1]),
            (j1, "=E1+I1", vec![e1, i1]),
        ];
        for (f, text, inputs) in edges {
            g.formulas.insert((*f).clone(), text.to_string());
            g.f2v.ensure_left((*f).clone());
            g.f2i.ensure_left((*f).clone());
            for i in inputs {
                g.f2i.insert((*f).clone(), (*i).clone());
            }
        }

        assert_eq!(g.terminal_formulas(), vec![f1.clone(), j1.clone()]);
        let m = all_simple_paths(&g, &Progress::noop());

        // Single-tier formulas sit one hop above the raw cell.
        for f in [b1, c1, d1, e1] {
            assert_eq!(m.distances(f, &a1), lens(&[1]));
        }
        // Two-tier formulas reach A1 through either branch, always two hops.
        for f in [f1, g1, h1] {
            assert_eq!(m.distances(f, &a1), lens(&[2]));
        }
        // I1 reaches D1 directly and through G1/H1.
        assert_eq!(m.distances(i1, d1), lens(&[1, 2]));
        // I1 reaches A1 via D1 (2 hops) or via G1/H1 then B1/C1/D1 (3 hops).
        assert_eq!(m.distances(i1, &a1), lens(&[2, 3]));
        // J1 adds one more hop on every path, plus the E1 shortcut.
        assert_eq!(m.distances(j1, &a1), lens(&[2, 3, 4]));
    }

    #[test]
    fn test_cycle_terminates() {
        // B1 = C1, C1 = B1, and D1 = B1 gives the cycle a dependent sink.
        let mut g = DepGraph::new("dir".into(), "book.xlsx".into(), vec!["Sheet1".into()]);
        let b1 = addr(1, 2);
        let c1 = addr(1, 3);
        let d1 = addr(1, 4);
        for (f, text) in [(&b1, "=C1"), (&c1, "=B1"), (&d1, "=B1")] {
            g.formulas.insert(f.clone(), text.to_string());
            g.f2v.ensure_left(f.clone());
            g.f2i.ensure_left(f.clone());
        }
        g.f2i.insert(b1.clone(), c1.clone());
        g.f2i.insert(c1.clone(), b1.clone());
        g.f2i.insert(d1.clone(), b1.clone());

        let m = all_simple_paths(&g, &Progress::noop());
        assert_eq!(m.distances(&d1, &b1), lens(&[1]));
        assert_eq!(m.distances(&d1, &c1), lens(&[2]));
    }

    #[test]
    fn test_pure_cycle_yields_no_rows() {
        // B1 = C1 and C1 = B1 with no dependent sink: nothing to traverse
        // from, so the matrix stays empty. Loop detection is the caller's
        // tool for this shape.
        let mut g = DepGraph::new("dir".into(), "book.xlsx".into(), vec!["Sheet1".into()]);
        let b1 = addr(1, 2);
        let c1 = addr(1, 3);
        for (f, text) in [(&b1, "=C1"), (&c1, "=B1")] {
            g.formulas.insert(f.clone(), text.to_string());
            g.f2v.ensure_left(f.clone());
            g.f2i.ensure_left(f.clone());
        }
        g.f2i.insert(b1.clone(), c1.clone());
        g.f2i.insert(c1.clone(), b1.clone());

        assert!(g.terminal_formulas().is_empty());
        let m = all_simple_paths(&g, &Progress::noop());
        assert!(m.is_empty());
        assert!(g.contains_loop());
    }

    #[test]
    fn test_cancelled_traversal_stops() {
        let g = chain_graph();
        let p = Progress::noop();
        p.cancel();
        let m = all_simple_paths(&g, &p);
        assert!(m.is_empty());
    }
}
