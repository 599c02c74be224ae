//! Data source abstraction.
//!
//! The graph is built against a [`DataSource`] rather than a concrete host
//! application. A source exposes workbook structure, per-sheet cell content,
//! and the ability to resolve references into open workbooks.

use rustc_hash::FxHashSet;

use crate::addr::Address;
use crate::handle::Locator;
use crate::range::Range;
use crate::value::RawValue;

/// One worksheet's contents as scanned by a data source.
#[derive(Clone, Debug, Default)]
pub struct WorksheetScan {
    pub worksheet: String,
    /// Formula cells with their formula text (including the leading `=`).
    pub formulas: Vec<(Address, String)>,
    /// Non-formula cells only; formula cells never appear here.
    pub values: Vec<(Address, RawValue)>,
    /// Pre-resolved locators harvested during the bulk scan, so the builder
    /// need not resolve each cell individually.
    pub handles: Vec<(Address, Locator)>,
}

/// A provider of workbook structure and cell content.
///
/// Implemented by host adapters in production and by the in-memory test
/// workbook in [`crate::harness`].
pub trait DataSource {
    /// File name of the workbook the graph is built from.
    fn workbook_name(&self) -> &str;

    /// Directory containing that workbook.
    fn workbook_dir(&self) -> &str;

    /// Worksheet names in sheet order.
    fn worksheet_names(&self) -> Vec<String>;

    /// Names of every workbook currently open in the host. References into
    /// workbooks not in this set get `NonLocal` handles.
    fn open_workbooks(&self) -> FxHashSet<String>;

    /// Scan one worksheet of the primary workbook. `None` if no such sheet.
    fn scan_worksheet(&self, worksheet: &str) -> Option<WorksheetScan>;

    /// Resolve a cell reference into an open workbook.
    fn resolve_cell(&self, addr: &Address) -> Option<Locator>;

    /// Resolve a range reference into an open workbook.
    fn resolve_range(&self, range: &Range) -> Option<Locator>;

    /// Current raw content of a cell, formula cells included (a formula
    /// cell reads back its display value). `None` if unreadable.
    fn read_value(&self, addr: &Address) -> Option<RawValue>;
}
