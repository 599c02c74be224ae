//! Graph construction.
//!
//! Building runs in two phases. Phase one scans every worksheet and extracts
//! references from each formula; extraction is pure, so it fans out across a
//! rayon thread pool. Phase two applies the extracted references to the
//! graph single-threaded, deriving handles and wiring the three adjacency
//! relations. Distances are computed last.

use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::addr::Address;
use crate::distance::all_simple_paths;
use crate::error::GraphError;
use crate::extract::{FormulaRefs, ReferenceExtractor};
use crate::graph::DepGraph;
use crate::handle::RefHandle;
use crate::progress::Progress;
use crate::range::Range;
use crate::source::DataSource;

/// Build configuration.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// When set, a formula that fails to parse is kept as a node with no
    /// outgoing edges instead of failing the whole build.
    pub ignore_parse_errors: bool,
}

/// Summary of a finished (or cancelled) build.
#[derive(Clone, Debug)]
pub struct BuildReport {
    pub formulas: usize,
    pub vectors: usize,
    pub input_cells: usize,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn summary(&self) -> String {
        format!(
            "{} formulas, {} vectors, {} input cells in {}ms{}",
            self.formulas,
            self.vectors,
            self.input_cells,
            self.duration_ms,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }

    pub fn log_line(&self) -> String {
        format!("graph build: {}", self.summary())
    }
}

impl DepGraph {
    pub fn report(&self) -> BuildReport {
        BuildReport {
            formulas: self.formulas.len(),
            vectors: self.vector_handles.len(),
            input_cells: self.input_cell_count(),
            duration_ms: self.analysis_millis,
            cancelled: !self.is_complete(),
        }
    }
}

/// Build a dependency graph for the source's workbook.
///
/// Cancellation through `progress` is not an error: the returned graph is
/// marked incomplete and keeps whatever was built before the poll observed
/// the flag.
pub fn build(
    source: &dyn DataSource,
    extractor: &dyn ReferenceExtractor,
    options: &BuildOptions,
    progress: &Progress,
) -> Result<DepGraph, GraphError> {
    build_sheets(source, extractor, options, progress, source.worksheet_names())
}

/// Build a graph covering a single worksheet of the source's workbook.
pub fn build_worksheet(
    source: &dyn DataSource,
    extractor: &dyn ReferenceExtractor,
    options: &BuildOptions,
    progress: &Progress,
    worksheet: &str,
) -> Result<DepGraph, GraphError> {
    build_sheets(
        source,
        extractor,
        options,
        progress,
        vec![worksheet.to_string()],
    )
}

fn build_sheets(
    source: &dyn DataSource,
    extractor: &dyn ReferenceExtractor,
    options: &BuildOptions,
    progress: &Progress,
    worksheets: Vec<String>,
) -> Result<DepGraph, GraphError> {
    let started = Instant::now();

    let mut graph = DepGraph::new(
        source.workbook_dir().to_string(),
        source.workbook_name().to_string(),
        worksheets,
    );

    let mut formula_list: Vec<(Address, String)> = Vec::new();
    for sheet in graph.worksheets.clone() {
        let scan = source
            .scan_worksheet(&sheet)
            .ok_or_else(|| GraphError::UnknownWorksheet(sheet.clone()))?;
        for (addr, text) in scan.formulas {
            graph.f2v.ensure_left(addr.clone());
            graph.f2i.ensure_left(addr.clone());
            graph.formulas.insert(addr.clone(), text.clone());
            formula_list.push((addr, text));
        }
        for (addr, value) in scan.values {
            graph.values.insert(addr, value);
        }
        for (addr, loc) in scan.handles {
            graph
                .cell_handles
                .fetch_or_insert(&addr, || RefHandle::Local(loc));
        }
    }

    progress.set_total(formula_list.len() as u64);

    // Phase one: parallel reference extraction.
    let extracted: Vec<Option<(Address, FormulaRefs)>> = formula_list
        .par_iter()
        .map(|(addr, text)| {
            if progress.is_cancelled() {
                return Ok(None);
            }
            let refs = match extractor.references(text, addr) {
                Ok(refs) => refs,
                Err(_) if options.ignore_parse_errors => {
                    progress.increment();
                    return Ok(Some((addr.clone(), FormulaRefs::default())));
                }
                Err(err) => {
                    return Err(GraphError::Parse {
                        addr: addr.clone(),
                        source: err,
                    })
                }
            };
            progress.increment();
            Ok(Some((addr.clone(), refs)))
        })
        .collect::<Result<_, GraphError>>()?;

    if progress.is_cancelled() {
        graph.mark_incomplete();
        graph.analysis_millis = started.elapsed().as_millis() as u64;
        return Ok(graph);
    }

    // Phase two: apply references single-threaded.
    let open = source.open_workbooks();
    for entry in extracted.into_iter().flatten() {
        let (addr, refs) = entry;
        apply_refs(&mut graph, source, &open, &addr, &refs);
    }

    graph.dist_f2i = all_simple_paths(&graph, progress);
    graph.dist_i2f = graph.dist_f2i.transpose();
    if progress.is_cancelled() {
        graph.mark_incomplete();
    }

    graph.analysis_millis = started.elapsed().as_millis() as u64;
    Ok(graph)
}

/// Wire one formula's extracted references into the graph.
///
/// Shared between the initial build and incremental updates.
pub(crate) fn apply_refs(
    graph: &mut DepGraph,
    source: &dyn DataSource,
    open: &FxHashSet<String>,
    formula: &Address,
    refs: &FormulaRefs,
) {
    derive_cell_handle(graph, source, open, formula);

    for range in &refs.ranges {
        derive_range_handle(graph, source, open, range);
        graph.f2v.insert(formula.clone(), range.clone());
        for cell in range.addresses() {
            graph.v2i.insert(range.clone(), cell);
        }
        mark_perturbability(graph, range);
    }

    for cell in &refs.cells {
        graph.f2i.insert(formula.clone(), cell.clone());
        derive_cell_handle(graph, source, open, cell);
    }
}

pub(crate) fn derive_cell_handle(
    graph: &mut DepGraph,
    source: &dyn DataSource,
    open: &FxHashSet<String>,
    addr: &Address,
) {
    graph.cell_handles.fetch_or_insert(addr, || {
        if open.contains(&addr.workbook) {
            if let Some(loc) = source.resolve_cell(addr) {
                return RefHandle::Local(loc);
            }
        }
        RefHandle::NonLocal {
            dir: addr.dir.clone(),
            workbook: addr.workbook.clone(),
            worksheet: addr.worksheet.clone(),
        }
    });
}

pub(crate) fn derive_range_handle(
    graph: &mut DepGraph,
    source: &dyn DataSource,
    open: &FxHashSet<String>,
    range: &Range,
) -> RefHandle {
    graph.vector_handles.fetch_or_insert(range, || {
        if open.contains(&range.workbook) {
            if let Some(loc) = source.resolve_range(range) {
                return RefHandle::Local(loc);
            }
        }
        RefHandle::NonLocal {
            dir: range.dir.clone(),
            workbook: range.workbook.clone(),
            worksheet: range.worksheet.clone(),
        }
    })
}

/// A vector starts out frozen (must not be perturbed) and flips to
/// perturbable the first time a covered cell turns out not to be a formula
/// output. A vector made up entirely of formulas stays frozen.
pub(crate) fn mark_perturbability(graph: &mut DepGraph, range: &Range) {
    let has_raw_component = range.addresses().any(|c| !graph.formulas.contains_key(&c));
    let entry = graph.do_not_perturb.entry(range.clone()).or_insert(true);
    if has_raw_component {
        *entry = false;
    }
}
