//! In-memory workbook and reference extractor for tests and examples.
//!
//! `MockWorkbook` implements [`DataSource`] over a plain cell map;
//! `SimpleExtractor` implements [`ReferenceExtractor`] with a small A1-style
//! tokenizer. Together they let graph behavior be exercised without a host
//! application or a real formula parser.

use rustc_hash::FxHashSet;

use crate::addr::{Address, AddressMode};
use crate::extract::{FormulaRefs, ParseError, ReferenceExtractor};
use crate::handle::Locator;
use crate::range::Range;
use crate::source::{DataSource, WorksheetScan};
use crate::value::RawValue;

/// One sheet of a [`MockWorkbook`]: raw text per (row, col).
#[derive(Clone, Debug, Default)]
pub struct MockSheet {
    pub name: String,
    pub cells: Vec<((u32, u32), String)>,
}

/// An in-memory workbook. Cells hold raw text; anything starting with `=`
/// is a formula.
#[derive(Clone, Debug)]
pub struct MockWorkbook {
    dir: String,
    name: String,
    sheets: Vec<MockSheet>,
    extra_open: FxHashSet<String>,
}

impl MockWorkbook {
    pub fn new(name: &str) -> Self {
        Self {
            dir: "/mock".to_string(),
            name: name.to_string(),
            sheets: vec![MockSheet {
                name: "Sheet1".to_string(),
                cells: Vec::new(),
            }],
            extra_open: FxHashSet::default(),
        }
    }

    pub fn add_sheet(&mut self, name: &str) {
        self.sheets.push(MockSheet {
            name: name.to_string(),
            cells: Vec::new(),
        });
    }

    /// Mark another workbook as open in the host.
    pub fn mark_open(&mut self, workbook: &str) {
        self.extra_open.insert(workbook.to_string());
    }

    /// Set a cell's raw text, replacing any previous content.
    pub fn set(&mut self, sheet: &str, row: u32, col: u32, text: &str) {
        let s = self
            .sheets
            .iter_mut()
            .find(|s| s.name == sheet)
            .unwrap_or_else(|| panic!("no sheet named {sheet:?}"));
        if let Some(slot) = s.cells.iter_mut().find(|(rc, _)| *rc == (row, col)) {
            slot.1 = text.to_string();
        } else {
            s.cells.push(((row, col), text.to_string()));
        }
    }

    /// Address of a cell in this workbook.
    pub fn addr(&self, sheet: &str, row: u32, col: u32) -> Address {
        Address::new(
            self.dir.clone(),
            self.name.clone(),
            sheet,
            row,
            col,
            AddressMode::Absolute,
        )
    }

    /// Range in this workbook.
    pub fn range(&self, sheet: &str, top: u32, left: u32, bottom: u32, right: u32) -> Range {
        Range::new(
            self.dir.clone(),
            self.name.clone(),
            sheet,
            top,
            left,
            bottom,
            right,
        )
    }

    fn sheet(&self, name: &str) -> Option<&MockSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn cell_text(&self, addr: &Address) -> Option<&str> {
        if addr.workbook != self.name {
            return None;
        }
        self.sheet(&addr.worksheet)?
            .cells
            .iter()
            .find(|(rc, _)| *rc == (addr.row, addr.col))
            .map(|(_, text)| text.as_str())
    }
}

impl DataSource for MockWorkbook {
    fn workbook_name(&self) -> &str {
        &self.name
    }

    fn workbook_dir(&self) -> &str {
        &self.dir
    }

    fn worksheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn open_workbooks(&self) -> FxHashSet<String> {
        let mut open = self.extra_open.clone();
        open.insert(self.name.clone());
        open
    }

    fn scan_worksheet(&self, worksheet: &str) -> Option<WorksheetScan> {
        let sheet = self.sheet(worksheet)?;
        let mut scan = WorksheetScan {
            worksheet: worksheet.to_string(),
            ..Default::default()
        };
        for ((row, col), text) in &sheet.cells {
            let addr = self.addr(worksheet, *row, *col);
            scan.handles.push((
                addr.clone(),
                Locator::cell(self.name.clone(), worksheet.to_string(), *row, *col),
            ));
            if text.starts_with('=') {
                scan.formulas.push((addr, text.clone()));
            } else {
                scan.values.push((addr, RawValue::parse(text)));
            }
        }
        Some(scan)
    }

    fn resolve_cell(&self, addr: &Address) -> Option<Locator> {
        if addr.workbook != self.name || self.sheet(&addr.worksheet).is_none() {
            return None;
        }
        Some(Locator::cell(
            addr.workbook.clone(),
            addr.worksheet.clone(),
            addr.row,
            addr.col,
        ))
    }

    fn resolve_range(&self, range: &Range) -> Option<Locator> {
        if range.workbook != self.name || self.sheet(&range.worksheet).is_none() {
            return None;
        }
        Some(Locator {
            workbook: range.workbook.clone(),
            worksheet: range.worksheet.clone(),
            row: range.top,
            col: range.left,
            width: range.width(),
            height: range.height(),
        })
    }

    fn read_value(&self, addr: &Address) -> Option<RawValue> {
        self.cell_text(addr).map(RawValue::parse)
    }
}

/// Tokenizing reference extractor.
///
/// Understands `A1`, `$A$1`, `A1:B3`, `Sheet2!A1`, `'Other Sheet'!A1`, and
/// `[book.xlsx]Sheet1!A1`. Anything else (function names, literals) is
/// skipped. A `#` anywhere in the formula is treated as unparseable, which
/// tests use to provoke parse failures.
pub struct SimpleExtractor;

impl ReferenceExtractor for SimpleExtractor {
    fn references(&self, formula: &str, origin: &Address) -> Result<FormulaRefs, ParseError> {
        if formula.contains('#') {
            return Err(ParseError {
                formula: formula.to_string(),
                message: "unparseable token".to_string(),
            });
        }

        let body = formula.strip_prefix('=').unwrap_or(formula);
        let mut refs = FormulaRefs::default();

        for token in tokens(body) {
            match parse_ref(&token, origin) {
                Some(RefToken::Cell(addr)) => {
                    if !refs.cells.contains(&addr) {
                        refs.cells.push(addr);
                    }
                }
                Some(RefToken::Range(range)) => {
                    if !refs.ranges.contains(&range) {
                        refs.ranges.push(range);
                    }
                }
                None => {}
            }
        }
        Ok(refs)
    }
}

enum RefToken {
    Cell(Address),
    Range(Range),
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ':' | '!' | '[' | ']' | '.' | '_' | '$' | '\'' | ' ')
}

/// Split the formula body into candidate reference tokens.
///
/// Spaces only stay inside a token while a quoted sheet name is open, so
/// `'Other Sheet'!A1` survives as one token.
fn tokens(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in body.chars() {
        if c == '\'' {
            in_quote = !in_quote;
        }
        if is_token_char(c) && (c != ' ' || in_quote) {
            current.push(c);
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn parse_ref(token: &str, origin: &Address) -> Option<RefToken> {
    let cleaned: String = token.chars().filter(|c| *c != '\'').collect();
    let mut rest = cleaned.as_str();
    let mut workbook = origin.workbook.clone();
    let mut worksheet = origin.worksheet.clone();

    if let Some(close) = rest.find(']') {
        if !rest.starts_with('[') {
            return None;
        }
        workbook = rest[1..close].to_string();
        rest = &rest[close + 1..];
    }
    if let Some(bang) = rest.find('!') {
        worksheet = rest[..bang].to_string();
        rest = &rest[bang + 1..];
        if worksheet.is_empty() {
            return None;
        }
    }

    if let Some((start, end)) = rest.split_once(':') {
        let (r1, c1) = parse_cell(start)?;
        let (r2, c2) = parse_cell(end)?;
        return Some(RefToken::Range(Range::new(
            origin.dir.clone(),
            workbook,
            worksheet,
            r1.min(r2),
            c1.min(c2),
            r1.max(r2),
            c1.max(c2),
        )));
    }

    let (row, col) = parse_cell(rest)?;
    Some(RefToken::Cell(Address::new(
        origin.dir.clone(),
        workbook,
        worksheet,
        row,
        col,
        AddressMode::Absolute,
    )))
}

/// Parse a bare A1-style cell, ignoring `$` markers. Letters then digits,
/// both required; anything else is not a cell.
fn parse_cell(s: &str) -> Option<(u32, u32)> {
    let s: String = s.chars().filter(|c| *c != '$').collect();
    let split = s.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = s.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 || col == 0 {
        return None;
    }
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Address {
        Address::new("/mock", "book.xlsx", "Sheet1", 1, 1, AddressMode::Absolute)
    }

    fn extract(formula: &str) -> FormulaRefs {
        SimpleExtractor.references(formula, &origin()).unwrap()
    }

    #[test]
    fn test_scalar_refs() {
        let refs = extract("=A1+B2*3");
        assert!(refs.ranges.is_empty());
        assert_eq!(refs.cells.len(), 2);
        assert_eq!(refs.cells[0].a1_local(), "A1");
        assert_eq!(refs.cells[1].a1_local(), "B2");
    }

    #[test]
    fn test_absolute_markers_ignored() {
        let refs = extract("=$A$1+$B2");
        assert_eq!(refs.cells.len(), 2);
        assert_eq!(refs.cells[0].a1_local(), "A1");
        assert_eq!(refs.cells[1].a1_local(), "B2");
    }

    #[test]
    fn test_range_refs() {
        let refs = extract("=SUM(A1:B3)");
        assert!(refs.cells.is_empty());
        assert_eq!(refs.ranges.len(), 1);
        assert_eq!(refs.ranges[0].a1_local(), "A1:B3");
    }

    #[test]
    fn test_reversed_range_normalized() {
        let refs = extract("=SUM(B3:A1)");
        assert_eq!(refs.ranges[0].a1_local(), "A1:B3");
    }

    #[test]
    fn test_function_names_and_numbers_skipped() {
        let refs = extract("=SUM(1, 2.5) + COUNT(10)");
        assert!(refs.cells.is_empty());
        assert!(refs.ranges.is_empty());
    }

    #[test]
    fn test_cross_sheet_ref() {
        let refs = extract("=Sheet2!A1");
        assert_eq!(refs.cells[0].worksheet, "Sheet2");
        assert_eq!(refs.cells[0].workbook, "book.xlsx");
    }

    #[test]
    fn test_quoted_sheet_name() {
        let refs = extract("='Other Sheet'!A1");
        assert_eq!(refs.cells[0].worksheet, "Other Sheet");
    }

    #[test]
    fn test_cross_workbook_ref() {
        let refs = extract("=[other.xlsx]Sheet1!B2");
        assert_eq!(refs.cells[0].workbook, "other.xlsx");
        assert_eq!(refs.cells[0].worksheet, "Sheet1");
        assert_eq!(refs.cells[0].a1_local(), "B2");
    }

    #[test]
    fn test_duplicate_refs_deduped() {
        let refs = extract("=A1+A1+A1");
        assert_eq!(refs.cells.len(), 1);
    }

    #[test]
    fn test_hash_is_a_parse_error() {
        assert!(SimpleExtractor.references("=#REF!+A1", &origin()).is_err());
    }

    #[test]
    fn test_mock_workbook_scan() {
        let mut wb = MockWorkbook::new("book.xlsx");
        wb.set("Sheet1", 1, 1, "42");
        wb.set("Sheet1", 1, 2, "=A1");
        wb.set("Sheet1", 2, 1, "hello");

        let scan = wb.scan_worksheet("Sheet1").unwrap();
        assert_eq!(scan.formulas.len(), 1);
        assert_eq!(scan.values.len(), 2);
        assert_eq!(scan.formulas[0].0, wb.addr("Sheet1", 1, 2));
        assert!(wb.scan_worksheet("Nope").is_none());
    }

    #[test]
    fn test_mock_workbook_resolution() {
        let wb = MockWorkbook::new("book.xlsx");
        let here = wb.addr("Sheet1", 2, 3);
        let loc = wb.resolve_cell(&here).unwrap();
        assert_eq!((loc.row, loc.col, loc.width, loc.height), (2, 3, 1, 1));

        let elsewhere =
            Address::new("/mock", "other.xlsx", "Sheet1", 1, 1, AddressMode::Absolute);
        assert!(wb.resolve_cell(&elsewhere).is_none());

        let loc = wb.resolve_range(&wb.range("Sheet1", 1, 1, 3, 2)).unwrap();
        assert_eq!((loc.width, loc.height), (2, 3));
    }
}
