//! Raw cell values.
//!
//! Non-formula cell content is retained for change detection: a snapshot can
//! be compared against live sheet content without re-deriving the graph.

use serde::{Deserialize, Serialize};

/// Raw content of a non-formula cell.
///
/// Equality is type-aware: numbers compare numerically, text compares
/// textually, and a number never equals text. This makes `"1.0"` and `"1"`
/// equal once both have been parsed, which is what change detection wants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Parse raw cell text the way the scanner classifies it: numeric if the
    /// whole string parses as a number, text otherwise.
    pub fn parse(raw: &str) -> RawValue {
        match raw.trim().parse::<f64>() {
            Ok(n) => RawValue::Number(n),
            Err(_) => RawValue::Text(raw.to_string()),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, RawValue::Number(_))
    }
}

impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Number(a), RawValue::Number(b)) => a == b,
            (RawValue::Text(a), RawValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            RawValue::Text(s) => write!(f, "{}", s),
        }
    }
}
