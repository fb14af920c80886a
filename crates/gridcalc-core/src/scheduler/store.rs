//! Collaborators the scheduler drives: the cell store, the formula executor
//! and the reader handed to the executor.

use std::sync::Arc;

use gridcalc_engine::engine::{CellError, Value};

use crate::graph::{BoundingBox, CellId, CellPosition, SheetId};

/// A compiled formula, as far as the scheduler cares: the ranges it reads.
pub trait Formula {
    fn dependencies(&self) -> &[BoundingBox];
}

/// What a stored cell holds.
#[derive(Debug)]
pub enum CellSnapshot<F> {
    Constant(Value),
    Formula(Arc<F>),
}

impl<F> Clone for CellSnapshot<F> {
    fn clone(&self) -> Self {
        match self {
            CellSnapshot::Constant(value) => CellSnapshot::Constant(value.clone()),
            CellSnapshot::Formula(formula) => CellSnapshot::Formula(Arc::clone(formula)),
        }
    }
}

/// Read access to cell contents.
pub trait CellStore {
    type Formula: Formula;

    /// Content at `position`, `None` when the cell is empty.
    fn cell(&self, position: CellPosition) -> Option<CellSnapshot<Self::Formula>>;

    /// Where the cell with `id` currently lives.
    fn position_of(&self, id: CellId) -> Option<CellPosition>;

    /// Every position holding a constant or a formula.
    fn non_empty_positions(&self) -> Vec<CellPosition>;

    /// Every position holding a formula.
    fn formula_positions(&self) -> Vec<CellPosition>;

    fn sheet_exists(&self, sheet: SheetId) -> bool;

    /// Called once per position when its value is final for this recalculation.
    fn publish(&self, _position: CellPosition, _value: &Value) {}
}

/// Value access for a running formula.
///
/// Reading a cell or range that holds an error yields that error, so executors
/// propagate it with `?`.
pub trait CellReader {
    fn read_cell(&mut self, position: CellPosition) -> Result<Value, CellError>;

    /// Non-empty values of `bbox`, column by column.
    fn read_range(&mut self, bbox: &BoundingBox) -> Result<Vec<Value>, CellError>;
}

/// Runs compiled formulas.
pub trait FormulaExecutor {
    type Formula;

    /// Evaluate `formula`. `position` is `None` for ad-hoc formulas that are not
    /// stored in any cell.
    fn execute(
        &self,
        position: Option<CellPosition>,
        formula: &Self::Formula,
        reader: &mut dyn CellReader,
    ) -> Result<Value, CellError>;
}

/// A change reported to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    /// The content (constant or formula) at a position was replaced or cleared.
    ContentChanged(CellPosition),
    RowsInserted { sheet: SheetId, at: u32, count: u32 },
    RowsRemoved { sheet: SheetId, at: u32, count: u32 },
    ColumnsInserted { sheet: SheetId, at: u32, count: u32 },
    ColumnsRemoved { sheet: SheetId, at: u32, count: u32 },
    SheetAdded(SheetId),
    SheetRemoved(SheetId),
}
