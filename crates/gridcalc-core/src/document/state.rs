use std::sync::Arc;

use gridcalc_engine::engine::{CellRef, Value, format_value};

use super::cell::{Cell, CellContent, Input};
use super::formula::{CompiledFormula, RhaiExecutor};
use super::table::CellTable;
use crate::config::RecalcConfig;
use crate::error::{GridcalcError, Result};
use crate::graph::{CellId, CellPosition, SheetId};
use crate::scheduler::{Change, RecalcStats, Scheduler};

/// Name given to the sheet every new workbook starts with.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// In-memory workbook: cells on named sheets, Rhai formulas, and a scheduler
/// keeping evaluated values up to date.
#[derive(Debug)]
pub struct Workbook {
    pub(crate) table: CellTable,
    pub(crate) executor: RhaiExecutor,
    pub(crate) scheduler: Scheduler,
    pub(crate) config: RecalcConfig,
    next_sheet_id: SheetId,
    next_cell_id: CellId,
}

impl Workbook {
    /// Create a workbook with a single sheet named [`DEFAULT_SHEET_NAME`].
    pub fn new(config: RecalcConfig) -> Self {
        let mut workbook = Workbook {
            table: CellTable::default(),
            executor: RhaiExecutor::new(),
            scheduler: Scheduler::new(config.clone()),
            config,
            next_sheet_id: 0,
            next_cell_id: 0,
        };
        workbook.table.sheets.insert(0, DEFAULT_SHEET_NAME.to_string());
        workbook.next_sheet_id = 1;
        workbook
    }

    pub fn config(&self) -> &RecalcConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn cells(&self) -> &CellTable {
        &self.table
    }

    pub fn sheet_id(&self, name: &str) -> Result<SheetId> {
        self.table
            .sheet_id(name)
            .ok_or_else(|| GridcalcError::UnknownSheet(name.to_string()))
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.table.sheet_name(sheet)
    }

    /// Sheet names in creation order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.table.sheets.values().cloned().collect()
    }

    /// The first sheet, used when an address carries no sheet name.
    pub fn first_sheet(&self) -> SheetId {
        self.table.sheets.keys().next().copied().unwrap_or_default()
    }

    /// Position of `cell` on the sheet named `sheet`, checked against the sheet bounds.
    pub fn position(&self, sheet: &str, cell: CellRef) -> Result<CellPosition> {
        let sheet = self.sheet_id(sheet)?;
        self.position_on(sheet, cell)
    }

    fn position_on(&self, sheet: SheetId, cell: CellRef) -> Result<CellPosition> {
        let col = u32::try_from(cell.col).ok().filter(|c| *c <= self.config.last_col());
        let row = u32::try_from(cell.row).ok().filter(|r| *r <= self.config.last_row());
        match (col, row) {
            (Some(col), Some(row)) => Ok(CellPosition::new(sheet, col, row)),
            _ => Err(GridcalcError::OutOfBounds(cell.to_string())),
        }
    }

    /// Parse `A1` or `Sheet2!A1` (unqualified addresses use the first sheet).
    pub fn parse_address(&self, address: &str) -> Result<CellPosition> {
        let (sheet, cell) = match address.rsplit_once('!') {
            Some((sheet, cell)) => {
                let sheet = sheet
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .map(|s| s.replace("''", "'"))
                    .unwrap_or_else(|| sheet.to_string());
                (self.sheet_id(&sheet)?, cell)
            }
            None => (self.first_sheet(), address),
        };
        let cell = CellRef::from_str(cell.trim())
            .ok_or_else(|| GridcalcError::InvalidCellRef(address.to_string()))?;
        self.position_on(sheet, cell)
    }

    pub(crate) fn compile(&self, source: &str, sheet: SheetId) -> CompiledFormula {
        CompiledFormula::compile(
            source,
            sheet,
            |name| self.table.sheet_id(name),
            self.executor.engine(),
            &self.config,
        )
    }

    /// Store parsed input at `position`, keeping the cell id if one exists.
    pub(crate) fn store_input(&mut self, position: CellPosition, input: &str) {
        let content = match Input::parse(input) {
            Input::Empty => {
                self.table.remove(position);
                return;
            }
            Input::Number(n) => CellContent::Number(n),
            Input::Text(s) => CellContent::Text(s.to_string()),
            Input::Formula(source) => {
                CellContent::Formula(Arc::new(self.compile(source, position.sheet)))
            }
        };
        let existing = self.table.cells.get(&position).map(|c| c.id);
        let id = match existing {
            Some(id) => id,
            None => self.allocate_id(),
        };
        self.table.insert(position, Cell { id, content });
    }

    pub(crate) fn allocate_id(&mut self) -> CellId {
        let id = self.next_cell_id;
        self.next_cell_id += 1;
        id
    }

    /// Set cell contents from input string.
    ///
    /// Input starting with `=` is a formula, `"..."` is text, anything that
    /// parses as a number is a number, and blank input clears the cell.
    pub fn set_cell_from_input(&mut self, sheet: &str, cell: CellRef, input: &str) -> Result<CellPosition> {
        let position = self.position(sheet, cell)?;
        self.set_input_at(position, input)?;
        Ok(position)
    }

    /// [`Workbook::set_cell_from_input`] for a known position.
    pub fn set_input_at(&mut self, position: CellPosition, input: &str) -> Result<()> {
        if !self.table.sheets.contains_key(&position.sheet) {
            return Err(GridcalcError::UnknownSheet(format!("#{}", position.sheet)));
        }
        self.store_input(position, input);
        self.scheduler
            .notify(Change::ContentChanged(position), &self.table);
        Ok(())
    }

    /// Replace the input of the cell with `id`, wherever row and column edits
    /// have moved it.
    pub fn set_input_by_id(&mut self, id: CellId, input: &str) -> Result<CellPosition> {
        let position = self
            .position_of(id)
            .ok_or(GridcalcError::UnknownCellId(id))?;
        self.store_input(position, input);
        if self.table.ids.contains_key(&id) {
            self.scheduler.on_content_changed_by_id(id, &self.table);
        } else {
            // Blank input removed the cell and its id with it.
            self.scheduler
                .notify(Change::ContentChanged(position), &self.table);
        }
        Ok(position)
    }

    /// Clear the specified cell.
    pub fn clear_cell(&mut self, sheet: &str, cell: CellRef) -> Result<()> {
        let position = self.position(sheet, cell)?;
        if self.table.remove(position).is_some() {
            self.scheduler
                .notify(Change::ContentChanged(position), &self.table);
        }
        Ok(())
    }

    /// The input that would recreate the cell, if it is not empty.
    pub fn input(&self, position: CellPosition) -> Option<String> {
        self.table.get(position).map(|c| c.to_input_string())
    }

    pub fn cell_id(&self, position: CellPosition) -> Option<CellId> {
        self.table.cells.get(&position).map(|c| c.id)
    }

    pub fn position_of(&self, id: CellId) -> Option<CellPosition> {
        self.table.ids.get(&id).copied()
    }

    /// Add a sheet. Formulas already naming it start resolving.
    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        if name.trim().is_empty() || name.contains('!') {
            return Err(GridcalcError::InvalidSheetName(name.to_string()));
        }
        if self.table.sheet_id(name).is_some() {
            return Err(GridcalcError::DuplicateSheet(name.to_string()));
        }
        let sheet = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.table.sheets.insert(sheet, name.to_string());
        self.recompile_all();
        self.scheduler.notify(Change::SheetAdded(sheet), &self.table);
        Ok(sheet)
    }

    /// Remove a sheet and its cells. References to it become `#REF!` values.
    pub fn remove_sheet(&mut self, name: &str) -> Result<()> {
        let sheet = self.sheet_id(name)?;
        if self.table.sheets.len() == 1 {
            return Err(GridcalcError::LastSheet);
        }
        self.table.sheets.remove(&sheet);
        self.table.drain_where(|p| p.sheet == sheet);
        self.recompile_all();
        self.scheduler.notify(Change::SheetRemoved(sheet), &self.table);
        Ok(())
    }

    /// Recompile every formula against the current sheet names.
    pub(crate) fn recompile_all(&mut self) {
        for (position, source) in self.table.formulas() {
            let compiled = Arc::new(self.compile(&source, position.sheet));
            if let Some(mut cell) = self.table.cells.get_mut(&position) {
                cell.content = CellContent::Formula(compiled);
            }
        }
    }

    /// Bring every value up to date.
    pub fn recalculate(&mut self) -> RecalcStats {
        self.scheduler.recalculate(&self.table, &self.executor)
    }

    /// Positions that the next recalculation will evaluate.
    pub fn pending_positions(&mut self) -> Vec<CellPosition> {
        self.scheduler.prepare(&self.table);
        self.scheduler.pending().iter().collect()
    }

    /// Evaluated value at `position`, recalculating first if edits are pending.
    pub fn value_at(&mut self, position: CellPosition) -> Value {
        self.recalculate();
        self.scheduler.evaluated_value(position)
    }

    /// Evaluated value of `cell` on the sheet named `sheet`.
    pub fn value(&mut self, sheet: &str, cell: CellRef) -> Result<Value> {
        let position = self.position(sheet, cell)?;
        Ok(self.value_at(position))
    }

    /// Display text for a cell.
    pub fn display(&mut self, sheet: &str, cell: CellRef) -> Result<String> {
        Ok(format_value(&self.value(sheet, cell)?))
    }

    /// Evaluate a formula (with or without a leading `=`) as if it sat on
    /// `sheet`, without storing it anywhere.
    pub fn evaluate_ad_hoc(&mut self, formula: &str, sheet: &str) -> Result<Value> {
        let sheet = self.sheet_id(sheet)?;
        let source = formula.trim();
        let source = source.strip_prefix('=').unwrap_or(source);
        let compiled = self.compile(source, sheet);
        Ok(self
            .scheduler
            .evaluate_ad_hoc(&compiled, sheet, &self.table, &self.executor))
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new(RecalcConfig::default())
    }
}
