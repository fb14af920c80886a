use std::sync::Arc;

use gridcalc_engine::engine::{ShiftOperation, shift_formula_references};

use super::Workbook;
use super::cell::CellContent;
use crate::error::{GridcalcError, Result};
use crate::graph::{CellPosition, SheetId};
use crate::scheduler::Change;

/// Dimension for row/column operations
#[derive(Copy, Clone)]
enum Dimension {
    Row,
    Column,
}

impl Dimension {
    /// Get the coordinate value from a position for this dimension
    fn coord(&self, position: &CellPosition) -> u32 {
        match self {
            Dimension::Row => position.row,
            Dimension::Column => position.col,
        }
    }

    /// Create a new position with modified coordinate in this dimension
    fn moved(&self, position: &CellPosition, coord: u32) -> CellPosition {
        match self {
            Dimension::Row => CellPosition::new(position.sheet, position.col, coord),
            Dimension::Column => CellPosition::new(position.sheet, coord, position.row),
        }
    }

    fn insert_op(&self, at: u32) -> ShiftOperation {
        match self {
            Dimension::Row => ShiftOperation::InsertRow(at as usize),
            Dimension::Column => ShiftOperation::InsertColumn(at as usize),
        }
    }

    fn delete_op(&self, at: u32) -> ShiftOperation {
        match self {
            Dimension::Row => ShiftOperation::DeleteRow(at as usize),
            Dimension::Column => ShiftOperation::DeleteColumn(at as usize),
        }
    }
}

impl Workbook {
    fn last_index(&self, dim: Dimension) -> u32 {
        match dim {
            Dimension::Row => self.config.last_row(),
            Dimension::Column => self.config.last_col(),
        }
    }

    fn check_index(&self, dim: Dimension, at: u32) -> Result<()> {
        if at > self.last_index(dim) {
            let what = match dim {
                Dimension::Row => format!("row {}", u64::from(at) + 1),
                Dimension::Column => format!("column {}", u64::from(at) + 1),
            };
            return Err(GridcalcError::OutOfBounds(what));
        }
        Ok(())
    }

    /// Generic insert operation for row or column
    fn insert_dimension(&mut self, sheet: SheetId, dim: Dimension, at: u32) -> Result<()> {
        self.check_index(dim, at)?;
        let last = self.last_index(dim);

        // Cells pushed past the sheet edge are dropped.
        let cells_to_move = self
            .table
            .drain_where(|p| p.sheet == sheet && dim.coord(p) >= at);
        for (position, cell) in cells_to_move {
            let coord = dim.coord(&position);
            if coord >= last {
                continue;
            }
            self.table.insert(dim.moved(&position, coord + 1), cell);
        }

        self.shift_formulas(sheet, dim.insert_op(at));
        Ok(())
    }

    /// Generic delete operation for row or column
    fn delete_dimension(&mut self, sheet: SheetId, dim: Dimension, at: u32) -> Result<()> {
        self.check_index(dim, at)?;

        self.table
            .drain_where(|p| p.sheet == sheet && dim.coord(p) == at);
        let cells_to_move = self
            .table
            .drain_where(|p| p.sheet == sheet && dim.coord(p) > at);
        for (position, cell) in cells_to_move {
            let coord = dim.coord(&position);
            self.table.insert(dim.moved(&position, coord - 1), cell);
        }

        self.shift_formulas(sheet, dim.delete_op(at));
        Ok(())
    }

    /// Rewrite every formula's references into `sheet` for `op`, then recompile.
    /// Deleted references become `#REF!`.
    fn shift_formulas(&mut self, sheet: SheetId, op: ShiftOperation) {
        let target = self.table.sheet_name(sheet).unwrap_or_default().to_string();
        for (position, source) in self.table.formulas() {
            let shifted = shift_formula_references(&source, op, |qualifier| match qualifier {
                Some(name) => name == target,
                None => position.sheet == sheet,
            });
            let compiled = Arc::new(self.compile(&shifted, position.sheet));
            if let Some(mut cell) = self.table.cells.get_mut(&position) {
                cell.content = CellContent::Formula(compiled);
            }
        }
    }

    /// Insert a row above the specified row
    pub fn insert_row(&mut self, sheet: &str, at: u32) -> Result<()> {
        let sheet = self.sheet_id(sheet)?;
        self.insert_dimension(sheet, Dimension::Row, at)?;
        self.scheduler.notify(
            Change::RowsInserted { sheet, at, count: 1 },
            &self.table,
        );
        Ok(())
    }

    /// Delete the specified row
    pub fn delete_row(&mut self, sheet: &str, at: u32) -> Result<()> {
        let sheet = self.sheet_id(sheet)?;
        self.delete_dimension(sheet, Dimension::Row, at)?;
        self.scheduler.notify(
            Change::RowsRemoved { sheet, at, count: 1 },
            &self.table,
        );
        Ok(())
    }

    /// Insert a column left of the specified column
    pub fn insert_column(&mut self, sheet: &str, at: u32) -> Result<()> {
        let sheet = self.sheet_id(sheet)?;
        self.insert_dimension(sheet, Dimension::Column, at)?;
        self.scheduler.notify(
            Change::ColumnsInserted { sheet, at, count: 1 },
            &self.table,
        );
        Ok(())
    }

    /// Delete the specified column
    pub fn delete_column(&mut self, sheet: &str, at: u32) -> Result<()> {
        let sheet = self.sheet_id(sheet)?;
        self.delete_dimension(sheet, Dimension::Column, at)?;
        self.scheduler.notify(
            Change::ColumnsRemoved { sheet, at, count: 1 },
            &self.table,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_SHEET_NAME as S1;
    use gridcalc_engine::engine::{CellRef, ErrorKind, Value};

    fn r(name: &str) -> CellRef {
        CellRef::from_str(name).unwrap()
    }

    #[test]
    fn test_insert_row_moves_cells_and_shifts_references() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(S1, r("A1"), "5").unwrap();
        wb.set_cell_from_input(S1, r("A2"), "7").unwrap();
        wb.set_cell_from_input(S1, r("B1"), "=A1 + A2").unwrap();
        assert_eq!(wb.value(S1, r("B1")).unwrap(), Value::Number(12.0));

        wb.insert_row(S1, 1).unwrap();
        let b1 = wb.position(S1, r("B1")).unwrap();
        assert_eq!(wb.input(b1).as_deref(), Some("=A1 + A3"));
        assert_eq!(wb.value(S1, r("A3")).unwrap(), Value::Number(7.0));
        assert_eq!(wb.value(S1, r("B1")).unwrap(), Value::Number(12.0));
    }

    #[test]
    fn test_delete_column_invalidates_references() {
        let mut wb = Workbook::default();
        wb.set_cell_from_input(S1, r("B1"), "3").unwrap();
        wb.set_cell_from_input(S1, r("C1"), "=B1 * 2").unwrap();
        wb.delete_column(S1, 1).unwrap();

        let b1 = wb.position(S1, r("B1")).unwrap();
        assert_eq!(wb.input(b1).as_deref(), Some("=#REF! * 2"));
        let value = wb.value(S1, r("B1")).unwrap();
        assert_eq!(value.as_error().map(|e| e.kind), Some(ErrorKind::InvalidReference));
    }

    #[test]
    fn test_row_ops_only_touch_references_into_that_sheet() {
        let mut wb = Workbook::default();
        wb.add_sheet("Data").unwrap();
        wb.set_cell_from_input("Data", r("A2"), "4").unwrap();
        wb.set_cell_from_input(S1, r("A2"), "1").unwrap();
        wb.set_cell_from_input(S1, r("B1"), "=Data!A2 + A2").unwrap();

        wb.insert_row("Data", 0).unwrap();
        let b1 = wb.position(S1, r("B1")).unwrap();
        assert_eq!(wb.input(b1).as_deref(), Some("=Data!A3 + A2"));
        assert_eq!(wb.value(S1, r("B1")).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_cell_ids_follow_moves() {
        let mut wb = Workbook::default();
        let a1 = wb.set_cell_from_input(S1, r("A1"), "1").unwrap();
        let id = wb.cell_id(a1).unwrap();
        wb.insert_row(S1, 0).unwrap();
        assert_eq!(wb.position_of(id), Some(wb.position(S1, r("A2")).unwrap()));
    }

    #[test]
    fn test_out_of_range_row_is_rejected() {
        let mut wb = Workbook::default();
        let last = wb.config().max_rows;
        assert!(matches!(
            wb.insert_row(S1, last),
            Err(GridcalcError::OutOfBounds(_))
        ));
    }
}
