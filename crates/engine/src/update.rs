//! Incremental graph update.
//!
//! Replacing formula text does not mutate the existing graph: the update
//! produces a fresh copy so callers can keep the old graph for comparison or
//! roll back on cancellation.
//!
//! Scalar edges are updated by set difference against the replacement's
//! extracted references, touching only the replaced formulas. Vector edges
//! are cheap to derive and interact with perturbability marking, so that
//! side is rebuilt wholesale from every formula's current text. Distances
//! are recomputed afterwards.

use std::time::Instant;

use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;

use crate::addr::Address;
use crate::builder::{self, BuildOptions};
use crate::distance::all_simple_paths;
use crate::error::GraphError;
use crate::extract::{FormulaRefs, ReferenceExtractor};
use crate::graph::DepGraph;
use crate::progress::Progress;
use crate::source::DataSource;

impl DepGraph {
    /// Return a copy of this graph with the given formula cells rewritten to
    /// new formula text.
    ///
    /// Every replaced address must already hold a formula; naming a
    /// non-formula cell fails with [`GraphError::UnknownFormula`] before any
    /// work is done on that replacement. An empty replacement list yields a
    /// graph equivalent to `self`.
    pub fn copy_with_updated_formulas(
        &self,
        replacements: &[(Address, String)],
        source: &dyn DataSource,
        extractor: &dyn ReferenceExtractor,
        options: &BuildOptions,
        progress: &Progress,
    ) -> Result<DepGraph, GraphError> {
        let started = Instant::now();

        let mut graph = self.clone();
        graph.cancelled = false;
        graph.path_closure = OnceCell::new();
        let open = source.open_workbooks();

        for (addr, text) in replacements {
            if !graph.formulas.contains_key(addr) {
                return Err(GraphError::UnknownFormula(addr.clone()));
            }
            let refs = extract_or_default(extractor, text, addr, options)?;

            let old: FxHashSet<Address> =
                graph.f2i.left(addr).cloned().unwrap_or_default();
            let new: FxHashSet<Address> = refs.cells.iter().cloned().collect();

            for removed in old.difference(&new) {
                graph.f2i.remove(addr, removed);
            }
            for added in new.difference(&old) {
                graph.f2i.insert(addr.clone(), added.clone());
                builder::derive_cell_handle(&mut graph, source, &open, added);
            }

            graph.formulas.insert(addr.clone(), text.clone());
            // The formula cell itself may have moved workbooks open/closed
            // since the original build; re-derive its handle.
            graph.cell_handles.remove(addr);
            builder::derive_cell_handle(&mut graph, source, &open, addr);
        }

        // Vector side: drop and rebuild from every formula's current text.
        graph.f2v.clear();
        graph.v2i.clear();
        graph.vector_handles.clear();
        graph.do_not_perturb.clear();

        let formula_list: Vec<(Address, String)> = graph
            .formulas
            .iter()
            .map(|(a, t)| (a.clone(), t.clone()))
            .collect();
        progress.set_total(formula_list.len() as u64);

        for (addr, text) in &formula_list {
            if progress.is_cancelled() {
                graph.mark_incomplete();
                graph.analysis_millis = started.elapsed().as_millis() as u64;
                return Ok(graph);
            }
            graph.f2v.ensure_left(addr.clone());
            let refs = extract_or_default(extractor, text, addr, options)?;
            for range in &refs.ranges {
                builder::derive_range_handle(&mut graph, source, &open, range);
                graph.f2v.insert(addr.clone(), range.clone());
                for cell in range.addresses() {
                    graph.v2i.insert(range.clone(), cell);
                }
                builder::mark_perturbability(&mut graph, range);
            }
            progress.increment();
        }

        graph.dist_f2i = all_simple_paths(&graph, progress);
        graph.dist_i2f = graph.dist_f2i.transpose();
        if progress.is_cancelled() {
            graph.mark_incomplete();
        }

        graph.analysis_millis = started.elapsed().as_millis() as u64;
        Ok(graph)
    }
}

fn extract_or_default(
    extractor: &dyn ReferenceExtractor,
    text: &str,
    addr: &Address,
    options: &BuildOptions,
) -> Result<FormulaRefs, GraphError> {
    match extractor.references(text, addr) {
        Ok(refs) => Ok(refs),
        Err(_) if options.ignore_parse_errors => Ok(FormulaRefs::default()),
        Err(err) => Err(GraphError::Parse {
            addr: addr.clone(),
            source: err,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::harness::{MockWorkbook, SimpleExtractor};

    fn built(wb: &MockWorkbook) -> DepGraph {
        build(wb, &SimpleExtractor, &BuildOptions::default(), &Progress::noop()).unwrap()
    }

    fn updated(g: &DepGraph, wb: &MockWorkbook, repl: &[(Address, String)]) -> DepGraph {
        g.copy_with_updated_formulas(
            repl,
            wb,
            &SimpleExtractor,
            &BuildOptions::default(),
            &Progress::noop(),
        )
        .unwrap()
    }

    #[test]
    fn test_scalar_edges_follow_replacement() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1"); // A1
        wb.set("Sheet1", 2, 1, "2"); // A2
        wb.set("Sheet1", 1, 2, "=A1"); // B1

        let g = built(&wb);
        let b1 = wb.addr("Sheet1", 1, 2);
        let a1 = wb.addr("Sheet1", 1, 1);
        let a2 = wb.addr("Sheet1", 2, 1);
        assert_eq!(g.scalar_inputs_of(&b1), vec![a1.clone()]);

        let g2 = updated(&g, &wb, &[(b1.clone(), "=A2".to_string())]);
        assert_eq!(g2.scalar_inputs_of(&b1), vec![a2.clone()]);
        assert_eq!(g2.formula_text(&b1), Some("=A2"));
        assert!(g2.formulas_using_cell(&a1).is_empty());
        assert_eq!(g2.formulas_using_cell(&a2), vec![b1.clone()]);
        g2.assert_consistent();

        // The source graph is untouched.
        assert_eq!(g.scalar_inputs_of(&b1), vec![a1]);
        assert_eq!(g.formula_text(&b1), Some("=A1"));
    }

    #[test]
    fn test_overlapping_replacement_keeps_shared_edge() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1"); // A1
        wb.set("Sheet1", 2, 1, "2"); // A2
        wb.set("Sheet1", 3, 1, "3"); // A3
        wb.set("Sheet1", 1, 2, "=A1+A2"); // B1

        let g = built(&wb);
        let b1 = wb.addr("Sheet1", 1, 2);
        let g2 = updated(&g, &wb, &[(b1.clone(), "=A2+A3".to_string())]);

        let mut inputs = g2.scalar_inputs_of(&b1);
        inputs.sort();
        assert_eq!(
            inputs,
            vec![wb.addr("Sheet1", 2, 1), wb.addr("Sheet1", 3, 1)]
        );
        g2.assert_consistent();
    }

    #[test]
    fn test_unknown_formula_rejected() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1");
        wb.set("Sheet1", 1, 2, "=A1");

        let g = built(&wb);
        let not_a_formula = wb.addr("Sheet1", 1, 1);
        let err = g
            .copy_with_updated_formulas(
                &[(not_a_formula.clone(), "=A2".to_string())],
                &wb,
                &SimpleExtractor,
                &BuildOptions::default(),
                &Progress::noop(),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownFormula(a) if a == not_a_formula));
    }

    #[test]
    fn test_empty_update_is_equivalent() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1");
        wb.set("Sheet1", 2, 1, "2");
        wb.set("Sheet1", 1, 2, "=SUM(A1:A2)");
        wb.set("Sheet1", 1, 3, "=B1+A1");

        let g = built(&wb);
        let g2 = updated(&g, &wb, &[]);

        assert_eq!(g2.formulas(), g.formulas());
        assert_eq!(g2.cells(), g.cells());
        assert_eq!(g2.vectors(), g.vectors());
        assert_eq!(g2.terminal_formulas(), g.terminal_formulas());
        assert_eq!(g2.perturbable_vectors(), g.perturbable_vectors());
        assert_eq!(g2.forward_distances(), g.forward_distances());
        assert_eq!(g2.inverse_distances(), g.inverse_distances());
        assert!(g2.is_complete());
        g2.assert_consistent();
    }

    #[test]
    fn test_vector_edges_rebuilt() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1"); // A1
        wb.set("Sheet1", 2, 1, "2"); // A2
        wb.set("Sheet1", 3, 1, "3"); // A3
        wb.set("Sheet1", 1, 2, "=SUM(A1:A2)"); // B1

        let g = built(&wb);
        let b1 = wb.addr("Sheet1", 1, 2);
        let g2 = updated(&g, &wb, &[(b1.clone(), "=SUM(A1:A3)".to_string())]);

        let old_vec = wb.range("Sheet1", 1, 1, 2, 1);
        let new_vec = wb.range("Sheet1", 1, 1, 3, 1);
        assert_eq!(g2.input_vectors_of(&b1), vec![new_vec.clone()]);
        assert!(g2.formulas_using_vector(&old_vec).is_empty());
        assert_eq!(g2.vectors(), vec![new_vec.clone()]);
        assert_eq!(g2.is_perturbable(&old_vec), None);
        assert_eq!(g2.is_perturbable(&new_vec), Some(true));
        assert_eq!(g2.cells_of_vector(&new_vec).len(), 3);
        g2.assert_consistent();
    }

    #[test]
    fn test_distances_recomputed() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1"); // A1
        wb.set("Sheet1", 1, 2, "=A1"); // B1
        wb.set("Sheet1", 1, 3, "=B1"); // C1

        let g = built(&wb);
        let a1 = wb.addr("Sheet1", 1, 1);
        let b1 = wb.addr("Sheet1", 1, 2);
        let c1 = wb.addr("Sheet1", 1, 3);
        assert_eq!(
            g.distances_formula_to_input(&c1, &a1),
            [2].into_iter().collect()
        );

        // C1 now reads A1 directly as well: two simple paths.
        let g2 = updated(&g, &wb, &[(c1.clone(), "=B1+A1".to_string())]);
        assert_eq!(
            g2.distances_formula_to_input(&c1, &a1),
            [1, 2].into_iter().collect()
        );
        assert_eq!(
            g2.distances_input_to_formula(&a1, &c1),
            [1, 2].into_iter().collect()
        );
        assert_eq!(
            g2.distances_formula_to_input(&b1, &a1),
            [1].into_iter().collect()
        );
    }

    #[test]
    fn test_parse_error_policy_applies() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1");
        wb.set("Sheet1", 1, 2, "=A1");

        let g = built(&wb);
        let b1 = wb.addr("Sheet1", 1, 2);

        let err = g.copy_with_updated_formulas(
            &[(b1.clone(), "=#BROKEN".to_string())],
            &wb,
            &SimpleExtractor,
            &BuildOptions::default(),
            &Progress::noop(),
        );
        assert!(matches!(err, Err(GraphError::Parse { .. })));

        let lenient = BuildOptions {
            ignore_parse_errors: true,
        };
        let g2 = g
            .copy_with_updated_formulas(
                &[(b1.clone(), "=#BROKEN".to_string())],
                &wb,
                &SimpleExtractor,
                &lenient,
                &Progress::noop(),
            )
            .unwrap();
        assert!(g2.scalar_inputs_of(&b1).is_empty());
        assert_eq!(g2.formula_text(&b1), Some("=#BROKEN"));
        g2.assert_consistent();
    }

    #[test]
    fn test_cancelled_update_keeps_partial_graph() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "1");
        wb.set("Sheet1", 1, 2, "=A1");

        let g = built(&wb);
        let b1 = wb.addr("Sheet1", 1, 2);
        let p = Progress::noop();
        p.cancel();

        let g2 = g
            .copy_with_updated_formulas(
                &[(b1.clone(), "=A1".to_string())],
                &wb,
                &SimpleExtractor,
                &BuildOptions::default(),
                &p,
            )
            .unwrap();
        assert!(!g2.is_complete());
        assert_eq!(g2.formula_text(&b1), Some("=A1"));
    }
}
