//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "B2", "AA100") and zero-indexed column/row coordinates, plus
//! the [`RangeRef`] shape used for references found inside formulas
//! (`A1`, `A1:B3`, `B:B`, `Sheet2!A1`, `'My Sheet'!A1:B2`).
//!
//! # Examples
//!
//! ```
//! use gridcalc_engine::engine::CellRef;
//!
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.col, 1); // 0-indexed
//! assert_eq!(cell.row, 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A reference to a cell by column and row indices (0-indexed).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

fn a1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$?(?<letters>[A-Za-z]+)\$?(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

impl CellRef {
    pub fn new(col: usize, row: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "B2", "AA10", "$C$4").
    /// Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        Self::parse_a1(name)
    }

    fn parse_a1(name: &str) -> Option<CellRef> {
        let caps = a1_re().captures(name)?;
        let col = letters_to_col(&caps["letters"])?;
        let row = caps["numbers"].parse::<usize>().ok()?.checked_sub(1)?;
        Some(CellRef::new(col, row))
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

/// Convert spreadsheet column letters to a zero-based index ("A" -> 0, "AA" -> 26).
pub fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut col_acc = 0usize;
    for c in letters.to_ascii_uppercase().bytes() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        let digit = (c - b'A') as usize + 1;
        col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
    }
    col_acc.checked_sub(1)
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

/// How a reference was written in the formula text.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum RefKind {
    /// A single cell, `A1`.
    Cell,
    /// A rectangle, `A1:B3`.
    Range,
    /// Whole columns, `B:D`. Rows are left open and clamped by the consumer.
    Columns,
}

/// A rectangular reference as written in a formula, before the sheet name is
/// resolved to an id.
///
/// `start` is always the top-left corner and `end` the bottom-right one, whatever
/// order the corners were written in. For [`RefKind::Columns`] the rows are
/// `0..=usize::MAX`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct RangeRef {
    pub sheet: Option<String>,
    pub start: CellRef,
    pub end: CellRef,
    pub kind: RefKind,
}

impl RangeRef {
    pub fn cell(sheet: Option<String>, cell: CellRef) -> RangeRef {
        RangeRef {
            sheet,
            start: cell,
            end: cell,
            kind: RefKind::Cell,
        }
    }

    pub fn range(sheet: Option<String>, a: CellRef, b: CellRef) -> RangeRef {
        RangeRef {
            sheet,
            start: CellRef::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellRef::new(a.col.max(b.col), a.row.max(b.row)),
            kind: RefKind::Range,
        }
    }

    pub fn columns(sheet: Option<String>, a: usize, b: usize) -> RangeRef {
        RangeRef {
            sheet,
            start: CellRef::new(a.min(b), 0),
            end: CellRef::new(a.max(b), usize::MAX),
            kind: RefKind::Columns,
        }
    }

    /// Whether this reference reads exactly one cell as a scalar.
    pub fn is_single(&self) -> bool {
        self.kind == RefKind::Cell
    }
}

/// Render a sheet name the way it must appear before `!` in a formula.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        match self.kind {
            RefKind::Cell => write!(f, "{}", self.start),
            RefKind::Range => write!(f, "{}:{}", self.start, self.end),
            RefKind::Columns => write!(
                f,
                "{}:{}",
                CellRef::col_to_letters(self.start.col),
                CellRef::col_to_letters(self.end.col)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_a1_overflow_returns_none() {
        let huge = format!("{}1", "Z".repeat(40));
        assert!(CellRef::from_str(&huge).is_none());
    }

    #[test]
    fn test_col_to_letters_handles_max_usize() {
        let letters = CellRef::col_to_letters(usize::MAX);
        assert!(!letters.is_empty());
        assert!(letters.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_absolute_markers_are_accepted() {
        assert_eq!(CellRef::from_str("$C$4"), Some(CellRef::new(2, 3)));
        assert_eq!(CellRef::from_str("C$4"), Some(CellRef::new(2, 3)));
    }

    #[test]
    fn test_range_normalizes_corners() {
        let r = RangeRef::range(None, CellRef::new(3, 9), CellRef::new(1, 2));
        assert_eq!(r.start, CellRef::new(1, 2));
        assert_eq!(r.end, CellRef::new(3, 9));
        assert_eq!(r.to_string(), "B3:D10");
    }

    #[test]
    fn test_display_quotes_sheet_names_when_needed() {
        let plain = RangeRef::cell(Some("Sheet2".into()), CellRef::new(0, 0));
        assert_eq!(plain.to_string(), "Sheet2!A1");

        let spaced = RangeRef::columns(Some("My Sheet".into()), 1, 1);
        assert_eq!(spaced.to_string(), "'My Sheet'!B:B");

        let quoted = RangeRef::cell(Some("Bob's".into()), CellRef::new(1, 1));
        assert_eq!(quoted.to_string(), "'Bob''s'!B2");
    }
}
