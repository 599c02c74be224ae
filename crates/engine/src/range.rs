//! Rectangular cell ranges (vectors).
//!
//! A `Range` is a worksheet-scoped rectangular block of cells, identified by
//! its bounds. Ranges are the "vector" nodes of the dependency graph: a
//! formula referencing `A1:A10` links to the range, and the range links to
//! each covered cell.

use serde::{Deserialize, Serialize};

use crate::addr::{col_to_letters, Address, AddressMode, PathTriple};

/// A rectangular block of cells on one worksheet, identified by bounds.
///
/// Bounds are 1-based and inclusive. Equal by bounds; covered addresses are
/// expanded lazily via [`Range::addresses`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub dir: String,
    pub workbook: String,
    pub worksheet: String,
    /// Top row (1-based, inclusive).
    pub top: u32,
    /// Left column (1-based, inclusive).
    pub left: u32,
    /// Bottom row (1-based, inclusive).
    pub bottom: u32,
    /// Right column (1-based, inclusive).
    pub right: u32,
}

impl Range {
    pub fn new(
        dir: impl Into<String>,
        workbook: impl Into<String>,
        worksheet: impl Into<String>,
        top: u32,
        left: u32,
        bottom: u32,
        right: u32,
    ) -> Self {
        Self {
            dir: dir.into(),
            workbook: workbook.into(),
            worksheet: worksheet.into(),
            top,
            left,
            bottom,
            right,
        }
    }

    /// Number of cells covered by this range.
    pub fn len(&self) -> usize {
        let height = (self.bottom - self.top + 1) as usize;
        let width = (self.right - self.left + 1) as usize;
        height * width
    }

    pub fn is_empty(&self) -> bool {
        // Bounds are inclusive, so a well-formed range always covers >= 1 cell.
        false
    }

    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    /// The scope triple this range lives in.
    pub fn path_triple(&self) -> PathTriple {
        (
            self.dir.clone(),
            self.workbook.clone(),
            self.worksheet.clone(),
        )
    }

    /// Lazily expand the range to every covered cell address.
    ///
    /// Addresses are produced row-major in absolute mode.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        (self.top..=self.bottom).flat_map(move |row| {
            (self.left..=self.right).map(move |col| {
                Address::new(
                    self.dir.clone(),
                    self.workbook.clone(),
                    self.worksheet.clone(),
                    row,
                    col,
                    AddressMode::Absolute,
                )
            })
        })
    }

    /// Worksheet-local A1-style label, e.g. `A1:B3`.
    pub fn a1_local(&self) -> String {
        format!(
            "{}{}:{}{}",
            col_to_letters(self.left),
            self.top,
            col_to_letters(self.right),
            self.bottom
        )
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.worksheet, self.a1_local())
    }
}
