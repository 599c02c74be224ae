//! The spreadsheet dependency graph.
//!
//! # Data model
//!
//! Nodes are of three kinds: formula cells, vectors (rectangular ranges a
//! formula reads as a unit), and plain cells. Three paired adjacency
//! relations connect them:
//!
//! - `f2v`: formula -> input vector
//! - `f2i`: formula -> single-cell input
//! - `v2i`: vector -> covered cell
//!
//! # Invariants
//!
//! - Every formula has a row in `f2v` and `f2i`, even when empty, so a
//!   formula with no references of one kind is still distinguishable from an
//!   unknown cell.
//! - Each adjacency relation mirrors its inverse exactly (see
//!   [`crate::adjacency::Adjacency`]).
//! - `values` holds non-formula cells only.
//! - The two distance matrices are exact transposes of each other.

use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::addr::{Address, PathTriple};
use crate::adjacency::Adjacency;
use crate::distance::DistanceMatrix;
use crate::handle::RefHandle;
use crate::range::Range;
use crate::ref_cache::RefCache;
use crate::source::DataSource;
use crate::value::RawValue;

/// A built dependency graph for one workbook.
///
/// Construction goes through [`crate::builder::build`]; this type owns the
/// node sets, edge relations, handles, and path-distance matrices, and
/// answers queries about them.
#[derive(Clone, Debug)]
pub struct DepGraph {
    pub(crate) dir: String,
    pub(crate) workbook: String,
    pub(crate) worksheets: Vec<String>,

    /// Formula cells with their formula text.
    pub(crate) formulas: FxHashMap<Address, String>,
    /// Non-formula cells with their raw content.
    pub(crate) values: FxHashMap<Address, RawValue>,

    pub(crate) cell_handles: RefCache<Address>,
    pub(crate) vector_handles: RefCache<Range>,

    pub(crate) f2v: Adjacency<Address, Range>,
    pub(crate) f2i: Adjacency<Address, Address>,
    pub(crate) v2i: Adjacency<Range, Address>,

    /// `true` marks a vector that must not be perturbed (it spans scopes or
    /// leaves the graph's workbook).
    pub(crate) do_not_perturb: FxHashMap<Range, bool>,
    pub(crate) weights: FxHashMap<Address, i32>,

    /// Forward matrix: formula -> input, all simple-path lengths.
    pub(crate) dist_f2i: DistanceMatrix,
    /// Transpose of `dist_f2i`.
    pub(crate) dist_i2f: DistanceMatrix,

    pub(crate) analysis_millis: u64,
    pub(crate) cancelled: bool,

    /// Sorted scope triples and their index, computed on first use and
    /// invalidated by updates.
    pub(crate) path_closure: OnceCell<(Vec<PathTriple>, FxHashMap<PathTriple, usize>)>,
}

impl DepGraph {
    pub(crate) fn new(dir: String, workbook: String, worksheets: Vec<String>) -> Self {
        Self {
            dir,
            workbook,
            worksheets,
            formulas: FxHashMap::default(),
            values: FxHashMap::default(),
            cell_handles: RefCache::new(),
            vector_handles: RefCache::new(),
            f2v: Adjacency::new(),
            f2i: Adjacency::new(),
            v2i: Adjacency::new(),
            do_not_perturb: FxHashMap::default(),
            weights: FxHashMap::default(),
            dist_f2i: DistanceMatrix::new(),
            dist_i2f: DistanceMatrix::new(),
            analysis_millis: 0,
            cancelled: false,
            path_closure: OnceCell::new(),
        }
    }

    // ---- identity ----------------------------------------------------

    pub fn workbook_name(&self) -> &str {
        &self.workbook
    }

    pub fn workbook_dir(&self) -> &str {
        &self.dir
    }

    /// Full path of the workbook file.
    pub fn workbook_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.dir).join(&self.workbook)
    }

    pub fn worksheet_names(&self) -> &[String] {
        &self.worksheets
    }

    /// Wall-clock duration of the build that produced this graph.
    pub fn analysis_millis(&self) -> u64 {
        self.analysis_millis
    }

    /// `false` when the producing build was cancelled partway. An incomplete
    /// graph keeps whatever was built before the cancellation.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
    }

    /// Flag this graph as the product of a cancelled build or fixup. Callers
    /// see it through [`DepGraph::is_complete`].
    pub fn mark_incomplete(&mut self) {
        self.cancelled = true;
    }

    // ---- cell queries ------------------------------------------------

    pub fn is_formula(&self, addr: &Address) -> bool {
        self.formulas.contains_key(addr)
    }

    pub fn formula_text(&self, addr: &Address) -> Option<&str> {
        self.formulas.get(addr).map(String::as_str)
    }

    /// Stored raw content of a non-formula cell.
    pub fn value_at(&self, addr: &Address) -> Option<&RawValue> {
        self.values.get(addr)
    }

    pub fn handle_for_address(&self, addr: &Address) -> Option<&RefHandle> {
        self.cell_handles.get(addr)
    }

    pub fn handle_for_range(&self, range: &Range) -> Option<&RefHandle> {
        self.vector_handles.get(range)
    }

    // ---- edge queries ------------------------------------------------

    /// Vectors a formula reads.
    pub fn input_vectors_of(&self, formula: &Address) -> Vec<Range> {
        self.f2v
            .left(formula)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Single-cell inputs a formula reads.
    pub fn scalar_inputs_of(&self, formula: &Address) -> Vec<Address> {
        self.f2i
            .left(formula)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Formulas reading a cell directly (scalar edge only).
    pub fn formulas_using_cell(&self, cell: &Address) -> Vec<Address> {
        self.f2i
            .right(cell)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Formulas reading a vector.
    pub fn formulas_using_vector(&self, vector: &Range) -> Vec<Address> {
        self.f2v
            .right(vector)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Vectors covering a cell.
    pub fn vectors_containing_cell(&self, cell: &Address) -> Vec<Range> {
        self.v2i
            .right(cell)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Cells a vector covers.
    pub fn cells_of_vector(&self, vector: &Range) -> Vec<Address> {
        self.v2i
            .left(vector)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every direct input cell of a formula: scalar inputs plus every cell
    /// covered by an input vector.
    pub fn direct_inputs(&self, formula: &Address) -> FxHashSet<Address> {
        let mut inputs: FxHashSet<Address> = FxHashSet::default();
        if let Some(cells) = self.f2i.left(formula) {
            inputs.extend(cells.iter().cloned());
        }
        if let Some(vectors) = self.f2v.left(formula) {
            for v in vectors {
                if let Some(cells) = self.v2i.left(v) {
                    inputs.extend(cells.iter().cloned());
                }
            }
        }
        inputs
    }

    // ---- node enumerations -------------------------------------------

    /// All formula cells, sorted.
    pub fn formulas(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.formulas.keys().cloned().collect();
        out.sort();
        out
    }

    /// Formula cells no other formula depends on, sorted. These are the
    /// graph's sinks and the starting points of path-distance traversal.
    pub fn terminal_formulas(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self
            .formulas
            .keys()
            .filter(|f| !self.f2i.contains_right(f) && !self.v2i.contains_right(f))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// All vectors, sorted.
    pub fn vectors(&self) -> Vec<Range> {
        let mut out: Vec<Range> = self.vector_handles.keys().cloned().collect();
        out.sort();
        out
    }

    /// Every known cell: formulas, scanned values, and reference targets.
    pub fn cells(&self) -> Vec<Address> {
        let mut set: FxHashSet<Address> = FxHashSet::default();
        set.extend(self.formulas.keys().cloned());
        set.extend(self.values.keys().cloned());
        set.extend(self.f2i.rights().cloned());
        set.extend(self.v2i.rights().cloned());
        let mut out: Vec<Address> = set.into_iter().collect();
        out.sort();
        out
    }

    /// Cells that are read by at least one formula, directly or through a
    /// vector.
    pub fn input_cells(&self) -> Vec<Address> {
        let mut set: FxHashSet<Address> = FxHashSet::default();
        set.extend(self.f2i.rights().cloned());
        set.extend(self.v2i.rights().cloned());
        let mut out: Vec<Address> = set.into_iter().collect();
        out.sort();
        out
    }

    pub fn input_cell_count(&self) -> usize {
        let mut set: FxHashSet<&Address> = FxHashSet::default();
        set.extend(self.f2i.rights());
        set.extend(self.v2i.rights());
        set.len()
    }

    /// Every cell participating in computation: inputs plus formulas, sorted.
    pub fn computation_cells(&self) -> Vec<Address> {
        let mut set: FxHashSet<Address> = FxHashSet::default();
        set.extend(self.formulas.keys().cloned());
        set.extend(self.f2i.rights().cloned());
        set.extend(self.v2i.rights().cloned());
        let mut out: Vec<Address> = set.into_iter().collect();
        out.sort();
        out
    }

    /// Non-formula leaves reachable from the terminal formulas: the raw data
    /// the workbook's final outputs ultimately depend on.
    pub fn terminal_input_cells(&self) -> Vec<Address> {
        let mut seen: FxHashSet<Address> = FxHashSet::default();
        let mut leaves: FxHashSet<Address> = FxHashSet::default();
        let mut stack: Vec<Address> = self.terminal_formulas();

        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            if self.is_formula(&node) {
                stack.extend(self.direct_inputs(&node));
            } else {
                leaves.insert(node);
            }
        }

        let mut out: Vec<Address> = leaves.into_iter().collect();
        out.sort();
        out
    }

    // ---- perturbability and weights ----------------------------------

    /// Vectors safe to perturb, sorted.
    pub fn perturbable_vectors(&self) -> Vec<Range> {
        let mut out: Vec<Range> = self
            .do_not_perturb
            .iter()
            .filter(|(_, frozen)| !**frozen)
            .map(|(r, _)| r.clone())
            .collect();
        out.sort();
        out
    }

    /// Whether a known vector may be perturbed. `None` for unknown vectors.
    pub fn is_perturbable(&self, vector: &Range) -> Option<bool> {
        self.do_not_perturb.get(vector).map(|frozen| !frozen)
    }

    pub fn set_weight(&mut self, cell: Address, weight: i32) {
        self.weights.insert(cell, weight);
    }

    pub fn weight(&self, cell: &Address) -> Option<i32> {
        self.weights.get(cell).copied()
    }

    // ---- path closure ------------------------------------------------

    fn closure(&self) -> &(Vec<PathTriple>, FxHashMap<PathTriple, usize>) {
        self.path_closure.get_or_init(|| {
            let mut set: FxHashSet<PathTriple> = FxHashSet::default();
            for addr in self.formulas.keys().chain(self.values.keys()) {
                set.insert(addr.path_triple());
            }
            for addr in self.f2i.rights().chain(self.v2i.rights()) {
                set.insert(addr.path_triple());
            }
            for range in self.vector_handles.keys() {
                set.insert(range.path_triple());
            }
            let mut triples: Vec<PathTriple> = set.into_iter().collect();
            triples.sort();
            let index = triples
                .iter()
                .enumerate()
                .map(|(i, t)| (t.clone(), i))
                .collect();
            (triples, index)
        })
    }

    /// Every distinct (dir, workbook, worksheet) scope the graph touches,
    /// sorted. Stable for the lifetime of the graph.
    pub fn path_closure(&self) -> &[PathTriple] {
        &self.closure().0
    }

    /// Index of a scope triple in [`DepGraph::path_closure`].
    pub fn path_closure_index(&self, triple: &PathTriple) -> Option<usize> {
        self.closure().1.get(triple).copied()
    }

    // ---- distances ---------------------------------------------------

    /// All simple-path lengths from a formula down to one of its inputs.
    pub fn distances_formula_to_input(&self, formula: &Address, input: &Address) -> FxHashSet<u32> {
        self.dist_f2i.distances(formula, input)
    }

    /// All simple-path lengths from an input up to a formula reading it.
    pub fn distances_input_to_formula(&self, input: &Address, formula: &Address) -> FxHashSet<u32> {
        self.dist_i2f.distances(input, formula)
    }

    /// Every input reachable from a formula, with its length set.
    pub fn distances_from_formula(
        &self,
        formula: &Address,
    ) -> Option<&FxHashMap<Address, FxHashSet<u32>>> {
        self.dist_f2i.all_from(formula)
    }

    /// Every formula reachable from an input, with its length set.
    pub fn distances_from_input(
        &self,
        input: &Address,
    ) -> Option<&FxHashMap<Address, FxHashSet<u32>>> {
        self.dist_i2f.all_from(input)
    }

    pub fn forward_distances(&self) -> &DistanceMatrix {
        &self.dist_f2i
    }

    pub fn inverse_distances(&self) -> &DistanceMatrix {
        &self.dist_i2f
    }

    // ---- handle maintenance ------------------------------------------

    pub fn handle_addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.cell_handles.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn handle_ranges(&self) -> Vec<Range> {
        let mut out: Vec<Range> = self.vector_handles.keys().cloned().collect();
        out.sort();
        out
    }

    /// Swap in a freshly resolved handle for a cell, e.g. after restoring a
    /// snapshot against a live source.
    pub fn replace_cell_handle(&mut self, addr: &Address, handle: RefHandle) {
        self.cell_handles.replace(addr, handle);
    }

    pub fn replace_vector_handle(&mut self, range: &Range, handle: RefHandle) {
        self.vector_handles.replace(range, handle);
    }

    // ---- export ------------------------------------------------------

    /// Render the graph as a DOT digraph.
    ///
    /// Node labels carry worksheet-local A1 names plus the cell's formula
    /// text or current value, read live from `source` when possible. Quotes
    /// inside formula text are escaped so the node names stay well-formed.
    pub fn edge_list(&self, source: &dyn DataSource) -> String {
        let label = |addr: &Address| -> String {
            let content = match self.formulas.get(addr) {
                Some(text) => text.clone(),
                None => source
                    .read_value(addr)
                    .or_else(|| self.values.get(addr).cloned())
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            };
            format!("{}[{}]", addr.a1_local(), content.replace('"', "\\\""))
        };

        let mut out = String::from("digraph {\n");
        let mut emitted_vectors: FxHashSet<Range> = FxHashSet::default();

        for formula in self.formulas() {
            let flabel = label(&formula);

            let mut scalars = self.scalar_inputs_of(&formula);
            scalars.sort();
            for input in scalars {
                out.push_str(&format!("  \"{}\" -> \"{}\";\n", label(&input), flabel));
            }

            let mut vectors = self.input_vectors_of(&formula);
            vectors.sort();
            for vector in vectors {
                out.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    vector.a1_local(),
                    flabel
                ));
                if emitted_vectors.insert(vector.clone()) {
                    let mut cells = self.cells_of_vector(&vector);
                    cells.sort();
                    for cell in cells {
                        out.push_str(&format!(
                            "  \"{}\" -> \"{}\";\n",
                            label(&cell),
                            vector.a1_local()
                        ));
                    }
                }
            }
        }

        out.push_str("}\n");
        out
    }

    // ---- change detection --------------------------------------------

    /// Whether the live source's content has drifted from what this graph
    /// was built from. Used to decide if a cached graph is still valid.
    pub fn differs_from_source(&self, source: &dyn DataSource) -> bool {
        if source.worksheet_names() != self.worksheets {
            return true;
        }

        for sheet in &self.worksheets {
            let scan = match source.scan_worksheet(sheet) {
                Some(s) => s,
                None => return true,
            };

            let stored_formulas =
                self.formulas.iter().filter(|(a, _)| &a.worksheet == sheet).count();
            let stored_values =
                self.values.iter().filter(|(a, _)| &a.worksheet == sheet).count();
            if scan.formulas.len() != stored_formulas || scan.values.len() != stored_values {
                return true;
            }

            for (addr, text) in &scan.formulas {
                if self.formulas.get(addr) != Some(text) {
                    return true;
                }
            }
            for (addr, value) in &scan.values {
                if self.values.get(addr) != Some(value) {
                    return true;
                }
            }
        }

        false
    }

    // ---- snapshot conversion -----------------------------------------

    /// Flatten the graph into plain vectors for persistence. Only forward
    /// edges and the forward distance matrix are included; inverses are
    /// rebuilt on restore.
    pub fn to_parts(&self) -> GraphParts {
        GraphParts {
            dir: self.dir.clone(),
            workbook: self.workbook.clone(),
            worksheets: self.worksheets.clone(),
            formulas: self.formulas.iter().map(|(a, t)| (a.clone(), t.clone())).collect(),
            values: self.values.iter().map(|(a, v)| (a.clone(), v.clone())).collect(),
            cell_handles: self
                .cell_handles
                .iter()
                .map(|(a, h)| (a.clone(), h.clone()))
                .collect(),
            vector_handles: self
                .vector_handles
                .iter()
                .map(|(r, h)| (r.clone(), h.clone()))
                .collect(),
            f2v: self.f2v.iter_edges().map(|(l, r)| (l.clone(), r.clone())).collect(),
            f2i: self.f2i.iter_edges().map(|(l, r)| (l.clone(), r.clone())).collect(),
            v2i: self.v2i.iter_edges().map(|(l, r)| (l.clone(), r.clone())).collect(),
            do_not_perturb: self
                .do_not_perturb
                .iter()
                .map(|(r, b)| (r.clone(), *b))
                .collect(),
            weights: self.weights.iter().map(|(a, w)| (a.clone(), *w)).collect(),
            distances: self
                .dist_f2i
                .iter()
                .map(|(from, to, lengths)| {
                    let mut sorted: Vec<u32> = lengths.iter().copied().collect();
                    sorted.sort_unstable();
                    (from.clone(), to.clone(), sorted)
                })
                .collect(),
            analysis_millis: self.analysis_millis,
        }
    }

    /// Rebuild a graph from persisted parts. Inverse relations and the
    /// transposed distance matrix are reconstructed here.
    pub fn from_parts(parts: GraphParts) -> Self {
        let mut graph = DepGraph::new(parts.dir, parts.workbook, parts.worksheets);

        for (addr, text) in parts.formulas {
            graph.f2v.ensure_left(addr.clone());
            graph.f2i.ensure_left(addr.clone());
            graph.formulas.insert(addr, text);
        }
        for (addr, value) in parts.values {
            graph.values.insert(addr, value);
        }
        for (addr, handle) in parts.cell_handles {
            graph.cell_handles.replace(&addr, handle);
        }
        for (range, handle) in parts.vector_handles {
            graph.vector_handles.replace(&range, handle);
        }
        for (f, v) in parts.f2v {
            graph.f2v.insert(f, v);
        }
        for (f, i) in parts.f2i {
            graph.f2i.insert(f, i);
        }
        for (v, i) in parts.v2i {
            graph.v2i.insert(v, i);
        }
        for (range, frozen) in parts.do_not_perturb {
            graph.do_not_perturb.insert(range, frozen);
        }
        for (addr, weight) in parts.weights {
            graph.weights.insert(addr, weight);
        }
        for (from, to, lengths) in parts.distances {
            for len in lengths {
                graph.dist_f2i.connect(from.clone(), to.clone(), len);
            }
        }
        graph.dist_i2f = graph.dist_f2i.transpose();
        graph.analysis_millis = parts.analysis_millis;
        graph
    }

    /// Check all cross-map invariants. Test-only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.f2v.assert_consistent();
        self.f2i.assert_consistent();
        self.v2i.assert_consistent();
        for f in self.formulas.keys() {
            assert!(self.f2v.contains_left(f), "formula missing f2v row");
            assert!(self.f2i.contains_left(f), "formula missing f2i row");
            assert!(!self.values.contains_key(f), "formula also stored as value");
        }
    }
}

/// Flattened graph content, the unit of persistence.
#[derive(Clone, Debug, Default)]
pub struct GraphParts {
    pub dir: String,
    pub workbook: String,
    pub worksheets: Vec<String>,
    pub formulas: Vec<(Address, String)>,
    pub values: Vec<(Address, RawValue)>,
    pub cell_handles: Vec<(Address, RefHandle)>,
    pub vector_handles: Vec<(Range, RefHandle)>,
    pub f2v: Vec<(Address, Range)>,
    pub f2i: Vec<(Address, Address)>,
    pub v2i: Vec<(Range, Address)>,
    pub do_not_perturb: Vec<(Range, bool)>,
    pub weights: Vec<(Address, i32)>,
    /// Forward distance matrix rows: (formula, input, sorted lengths).
    pub distances: Vec<(Address, Address, Vec<u32>)>,
    pub analysis_millis: u64,
}
