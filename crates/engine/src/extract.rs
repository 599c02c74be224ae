//! Formula reference extraction.
//!
//! The graph builder is parser-agnostic: callers supply a
//! [`ReferenceExtractor`] that turns formula text into the ranges and cells
//! it reads. The engine only cares about the extracted reference sets, never
//! about formula semantics.

use thiserror::Error;

use crate::addr::Address;
use crate::range::Range;

/// References extracted from one formula.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormulaRefs {
    /// Multi-cell references (vectors), e.g. `A1:A10`.
    pub ranges: Vec<Range>,
    /// Single-cell references, e.g. `B2`.
    pub cells: Vec<Address>,
}

/// Failure to parse a formula during extraction.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("failed to parse formula {formula:?}: {message}")]
pub struct ParseError {
    pub formula: String,
    pub message: String,
}

/// Turns formula text into the references it reads.
///
/// Implementations must be pure with respect to `(formula, origin)` so the
/// builder can run extraction for many formulas in parallel.
pub trait ReferenceExtractor: Sync {
    /// Extract every range and single-cell reference in `formula`.
    ///
    /// `origin` is the cell holding the formula; relative and sheet-less
    /// references resolve against its scope.
    fn references(&self, formula: &str, origin: &Address) -> Result<FormulaRefs, ParseError>;
}
