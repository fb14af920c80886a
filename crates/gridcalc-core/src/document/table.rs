use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;

use super::cell::{Cell, CellContent};
use super::formula::CompiledFormula;
use crate::graph::{CellId, CellPosition, SheetId};
use crate::scheduler::{CellSnapshot, CellStore};

/// Sparse cell storage for every sheet of a workbook.
#[derive(Debug, Default)]
pub struct CellTable {
    pub(crate) cells: DashMap<CellPosition, Cell>,
    pub(crate) ids: HashMap<CellId, CellPosition>,
    pub(crate) sheets: BTreeMap<SheetId, String>,
}

impl CellTable {
    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.sheets.get(&sheet).map(String::as_str)
    }

    pub fn get(&self, position: CellPosition) -> Option<Cell> {
        self.cells.get(&position).map(|c| c.clone())
    }

    pub(crate) fn insert(&mut self, position: CellPosition, cell: Cell) {
        self.ids.insert(cell.id, position);
        self.cells.insert(position, cell);
    }

    pub(crate) fn remove(&mut self, position: CellPosition) -> Option<Cell> {
        let (_, cell) = self.cells.remove(&position)?;
        self.ids.remove(&cell.id);
        Some(cell)
    }

    /// Remove and return every cell matching `pred`.
    pub(crate) fn drain_where(&mut self, pred: impl Fn(&CellPosition) -> bool) -> Vec<(CellPosition, Cell)> {
        let positions: Vec<CellPosition> = self
            .cells
            .iter()
            .map(|entry| *entry.key())
            .filter(|p| pred(p))
            .collect();
        positions
            .into_iter()
            .filter_map(|p| self.remove(p).map(|cell| (p, cell)))
            .collect()
    }

    /// Formula cells with their sources, on every sheet.
    pub(crate) fn formulas(&self) -> Vec<(CellPosition, String)> {
        self.cells
            .iter()
            .filter_map(|entry| match &entry.value().content {
                CellContent::Formula(f) => Some((*entry.key(), f.source.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl CellStore for CellTable {
    type Formula = CompiledFormula;

    fn cell(&self, position: CellPosition) -> Option<CellSnapshot<CompiledFormula>> {
        self.cells.get(&position).map(|c| c.snapshot())
    }

    fn position_of(&self, id: CellId) -> Option<CellPosition> {
        self.ids.get(&id).copied()
    }

    fn non_empty_positions(&self) -> Vec<CellPosition> {
        self.cells.iter().map(|entry| *entry.key()).collect()
    }

    fn formula_positions(&self) -> Vec<CellPosition> {
        self.cells
            .iter()
            .filter(|entry| entry.value().is_formula())
            .map(|entry| *entry.key())
            .collect()
    }

    fn sheet_exists(&self, sheet: SheetId) -> bool {
        self.sheets.contains_key(&sheet)
    }
}
