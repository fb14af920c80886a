//! Formula preprocessing and reference transformation.
//!
//! Before formulas can be evaluated by Rhai, references like `A1` or
//! `SUM(B1:B3)` must be replaced by something Rhai understands. This module
//! handles:
//!
//! - **Preparation**: every distinct reference becomes a bound variable
//!   (`A1 + SUM(B1:B3)` → `ref_0 + SUM(ref_1)`); the reference list is the
//!   formula's declared dependency list, in binding order.
//! - **Reference shifting**: adjusting references when rows/columns are
//!   inserted or deleted.

use super::cell_ref::{CellRef, RangeRef, RefKind};
use super::deps::{scan_references, strip_string_literals};

/// Marker a deleted reference is rewritten to.
pub const INVALID_REFERENCE: &str = "#REF!";

/// A formula rewritten for Rhai, with the references it reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedFormula {
    /// Rhai source; reference `i` is available as the variable [`binding_name`]`(i)`.
    pub script: String,
    /// Distinct references in order of first appearance.
    pub references: Vec<RangeRef>,
    /// The formula text contains a `#REF!` left behind by a deleted row, column or sheet.
    pub has_invalid_reference: bool,
}

/// Name of the Rhai variable bound to reference `index`.
pub fn binding_name(index: usize) -> String {
    format!("ref_{index}")
}

/// Rewrite a formula (without its leading `=`) into a [`PreparedFormula`].
pub fn prepare_formula(formula: &str) -> PreparedFormula {
    let has_invalid_reference = strip_string_literals(formula).contains(INVALID_REFERENCE);

    let mut references: Vec<RangeRef> = Vec::new();
    let mut script = String::with_capacity(formula.len());
    let mut cursor = 0;
    for found in scan_references(formula) {
        let index = match references.iter().position(|r| *r == found.reference) {
            Some(index) => index,
            None => {
                references.push(found.reference);
                references.len() - 1
            }
        };
        script.push_str(&formula[cursor..found.span.start]);
        script.push_str(&binding_name(index));
        cursor = found.span.end;
    }
    script.push_str(&formula[cursor..]);

    PreparedFormula {
        script,
        references,
        has_invalid_reference,
    }
}

/// Operation for shifting cell references in formulas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOperation {
    InsertRow(usize),
    DeleteRow(usize),
    InsertColumn(usize),
    DeleteColumn(usize),
}

/// Shift cell references in a formula when rows/cols are inserted/deleted.
/// Returns the updated formula string.
///
/// `affects` receives each reference's sheet qualifier (`None` when unqualified)
/// and decides whether that reference points at the sheet being modified.
///
/// Rules:
/// - Insert row at R: rows >= R become row + 1; a range spanning R grows
/// - Delete row at R: rows > R become row - 1; a range spanning R shrinks;
///   a reference entirely on row R becomes `#REF!`
/// - Same logic for columns; whole-column references ignore row operations
///
/// References are re-rendered only when they move, so untouched references
/// keep their original spelling (including `$` markers).
pub fn shift_formula_references(
    formula: &str,
    op: ShiftOperation,
    affects: impl Fn(Option<&str>) -> bool,
) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut cursor = 0;
    for found in scan_references(formula) {
        if !affects(found.reference.sheet.as_deref()) {
            continue;
        }
        let replacement = match shift_reference(&found.reference, op) {
            Some(shifted) if shifted == found.reference => continue,
            Some(shifted) => shifted.to_string(),
            None => INVALID_REFERENCE.to_string(),
        };
        out.push_str(&formula[cursor..found.span.start]);
        out.push_str(&replacement);
        cursor = found.span.end;
    }
    out.push_str(&formula[cursor..]);
    out
}

/// Shift one reference. `None` means the reference was deleted.
fn shift_reference(reference: &RangeRef, op: ShiftOperation) -> Option<RangeRef> {
    let mut shifted = reference.clone();
    let (start, end) = (reference.start, reference.end);
    match op {
        ShiftOperation::InsertRow(at) => {
            if reference.kind == RefKind::Columns {
                return Some(shifted);
            }
            let (top, bottom) = shift_span_insert(start.row, end.row, at)?;
            shifted.start = CellRef::new(start.col, top);
            shifted.end = CellRef::new(end.col, bottom);
        }
        ShiftOperation::DeleteRow(at) => {
            if reference.kind == RefKind::Columns {
                return Some(shifted);
            }
            let (top, bottom) = shift_span_delete(start.row, end.row, at)?;
            shifted.start = CellRef::new(start.col, top);
            shifted.end = CellRef::new(end.col, bottom);
        }
        ShiftOperation::InsertColumn(at) => {
            let (left, right) = shift_span_insert(start.col, end.col, at)?;
            shifted.start = CellRef::new(left, start.row);
            shifted.end = CellRef::new(right, end.row);
        }
        ShiftOperation::DeleteColumn(at) => {
            let (left, right) = shift_span_delete(start.col, end.col, at)?;
            shifted.start = CellRef::new(left, start.row);
            shifted.end = CellRef::new(right, end.row);
        }
    }
    Some(shifted)
}

fn shift_span_insert(first: usize, last: usize, at: usize) -> Option<(usize, usize)> {
    let first = if first >= at { first.checked_add(1)? } else { first };
    let last = if last >= at { last.checked_add(1)? } else { last };
    Some((first, last))
}

fn shift_span_delete(first: usize, last: usize, at: usize) -> Option<(usize, usize)> {
    if first == at && last == at {
        return None;
    }
    let first = if first > at { first - 1 } else { first };
    let last = if last >= at { last - 1 } else { last };
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn everywhere(_: Option<&str>) -> bool {
        true
    }

    #[test]
    fn test_prepare_binds_each_distinct_reference_once() {
        let prepared = prepare_formula("A1 + SUM(B1:B3) + A1");
        assert_eq!(prepared.script, "ref_0 + SUM(ref_1) + ref_0");
        assert_eq!(prepared.references.len(), 2);
        assert!(!prepared.has_invalid_reference);
    }

    #[test]
    fn test_prepare_leaves_strings_alone() {
        let prepared = prepare_formula(r#""A1" + B1"#);
        assert_eq!(prepared.script, r#""A1" + ref_0"#);
    }

    #[test]
    fn test_prepare_flags_deleted_references() {
        assert!(prepare_formula("#REF! + 1").has_invalid_reference);
        assert!(!prepare_formula(r##""#REF!""##).has_invalid_reference);
    }

    #[test]
    fn test_insert_row_shifts_refs_at_or_below() {
        let op = ShiftOperation::InsertRow(1);
        assert_eq!(shift_formula_references("A1 + A2", op, everywhere), "A1 + A3");
        assert_eq!(
            shift_formula_references("SUM(A1:A3)", op, everywhere),
            "SUM(A1:A4)"
        );
    }

    #[test]
    fn test_delete_row_invalidates_and_shrinks() {
        let op = ShiftOperation::DeleteRow(1);
        assert_eq!(shift_formula_references("A2 * 2", op, everywhere), "#REF! * 2");
        assert_eq!(shift_formula_references("A3", op, everywhere), "A2");
        assert_eq!(
            shift_formula_references("SUM(A1:A3)", op, everywhere),
            "SUM(A1:A2)"
        );
    }

    #[test]
    fn test_column_ops_move_whole_column_refs() {
        let op = ShiftOperation::InsertColumn(0);
        assert_eq!(shift_formula_references("SUM(B:B)", op, everywhere), "SUM(C:C)");
        let op = ShiftOperation::DeleteRow(0);
        assert_eq!(shift_formula_references("SUM(B:B)", op, everywhere), "SUM(B:B)");
    }

    #[test]
    fn test_shift_respects_sheet_filter() {
        let only_sheet2 = |sheet: Option<&str>| sheet == Some("Sheet2");
        let op = ShiftOperation::InsertRow(0);
        assert_eq!(
            shift_formula_references("A1 + Sheet2!A1", op, only_sheet2),
            "A1 + Sheet2!A2"
        );
    }

    #[test]
    fn test_unmoved_refs_keep_absolute_markers() {
        let op = ShiftOperation::InsertRow(5);
        assert_eq!(shift_formula_references("$A$1 + B9", op, everywhere), "$A$1 + B10");
    }
}
