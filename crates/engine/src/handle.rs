//! Host-independent reference handles.
//!
//! The original host application hands out live COM-style reference objects
//! for cells and ranges. Those objects cannot be persisted, so the graph
//! stores a value-typed [`RefHandle`] instead and re-resolves live references
//! against the data source when a snapshot is restored.

use serde::{Deserialize, Serialize};

/// Location of a resolvable cell or range inside an open workbook.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub workbook: String,
    pub worksheet: String,
    /// Top-left row (1-based).
    pub row: u32,
    /// Top-left column (1-based).
    pub col: u32,
    pub width: u32,
    pub height: u32,
}

impl Locator {
    pub fn cell(workbook: impl Into<String>, worksheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            workbook: workbook.into(),
            worksheet: worksheet.into(),
            row,
            col,
            width: 1,
            height: 1,
        }
    }
}

/// A persistable stand-in for a live host reference.
///
/// `Local` handles point into a workbook that was open when the handle was
/// derived; `NonLocal` handles record the scope of a reference into a closed
/// workbook, which cannot be resolved further.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefHandle {
    Local(Locator),
    NonLocal {
        dir: String,
        workbook: String,
        worksheet: String,
    },
}

impl RefHandle {
    pub fn is_local(&self) -> bool {
        matches!(self, RefHandle::Local(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_equality_by_locator() {
        let a = RefHandle::Local(Locator::cell("book.xlsx", "Sheet1", 1, 1));
        let b = RefHandle::Local(Locator::cell("book.xlsx", "Sheet1", 1, 1));
        let c = RefHandle::Local(Locator::cell("book.xlsx", "Sheet1", 2, 1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_local_vs_nonlocal() {
        let local = RefHandle::Local(Locator::cell("book.xlsx", "Sheet1", 1, 1));
        let nonlocal = RefHandle::NonLocal {
            dir: "dir".into(),
            workbook: "other.xlsx".into(),
            worksheet: "Sheet1".into(),
        };
        assert!(local.is_local());
        assert!(!nonlocal.is_local());
        assert_ne!(local, nonlocal);
    }
}
