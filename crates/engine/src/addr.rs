//! Cell identity for the dependency graph.
//!
//! An `Address` uniquely identifies a cell across every workbook the graph
//! may reference, not just the one it was built from. Cross-workbook formula
//! references are common in real sheets, so the full
//! (directory, workbook, worksheet) scope is part of the key.

use serde::{Deserialize, Serialize};

/// Addressing mode of a reference.
///
/// Retained from the source reference text; the graph itself treats both
/// modes identically (two addresses with different modes are different keys).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressMode {
    Absolute,
    Relative,
}

/// A (directory, workbook, worksheet) scope triple.
///
/// Used for the path closure and for classifying references as local or
/// non-local.
pub type PathTriple = (String, String, String);

/// Unique identifier for a cell.
///
/// Row and column are 1-based. Equal by value; used as the universal node
/// key in the dependency graph and both distance matrices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    /// Directory containing the workbook file.
    pub dir: String,
    /// Workbook file name.
    pub workbook: String,
    /// Worksheet name.
    pub worksheet: String,
    /// Row index (1-based).
    pub row: u32,
    /// Column index (1-based).
    pub col: u32,
    /// Addressing mode the reference was written in.
    pub mode: AddressMode,
}

impl Address {
    pub fn new(
        dir: impl Into<String>,
        workbook: impl Into<String>,
        worksheet: impl Into<String>,
        row: u32,
        col: u32,
        mode: AddressMode,
    ) -> Self {
        Self {
            dir: dir.into(),
            workbook: workbook.into(),
            worksheet: worksheet.into(),
            row,
            col,
            mode,
        }
    }

    /// The scope triple this address lives in.
    pub fn path_triple(&self) -> PathTriple {
        (
            self.dir.clone(),
            self.workbook.clone(),
            self.worksheet.clone(),
        )
    }

    /// Worksheet-local A1-style label, e.g. `C3`.
    pub fn a1_local(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.worksheet, self.a1_local())
    }
}

/// Convert a 1-based column index to Excel-style letter(s).
pub(crate) fn col_to_letters(col: u32) -> String {
    let mut result = String::new();
    let mut n = col as i64 - 1;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(row: u32, col: u32) -> Address {
        Address::new("dir", "book.xlsx", "Sheet1", row, col, AddressMode::Absolute)
    }

    #[test]
    fn test_address_equality() {
        assert_eq!(addr(1, 1), addr(1, 1));
        assert_ne!(addr(1, 1), addr(2, 1));

        let other_sheet =
            Address::new("dir", "book.xlsx", "Sheet2", 1, 1, AddressMode::Absolute);
        assert_ne!(addr(1, 1), other_sheet);
    }

    #[test]
    fn test_address_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(addr(1, 1));
        set.insert(addr(1, 1)); // duplicate
        set.insert(addr(2, 1));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_col_to_letters() {
        assert_eq!(col_to_letters(1), "A");
        assert_eq!(col_to_letters(2), "B");
        assert_eq!(col_to_letters(26), "Z");
        assert_eq!(col_to_letters(27), "AA");
        assert_eq!(col_to_letters(28), "AB");
        assert_eq!(col_to_letters(702), "ZZ");
        assert_eq!(col_to_letters(703), "AAA");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", addr(1, 1)), "Sheet1!A1");
        assert_eq!(format!("{}", addr(10, 27)), "Sheet1!AA10");
    }

    #[test]
    fn test_ordering_is_by_scope_then_position() {
        let a = addr(1, 1);
        let b = addr(1, 2);
        let c = addr(2, 1);
        assert!(a < b);
        assert!(b < c);
    }
}
