use std::collections::{BTreeMap, HashMap};

use gridcalc_engine::engine::Value;

use crate::graph::{BoundingBox, CellPosition, SheetId};

/// Evaluated values, keyed column-first so range reads are ordered scans.
/// Empty values are never stored.
#[derive(Debug, Default)]
pub struct ValueCache {
    sheets: HashMap<SheetId, BTreeMap<(u32, u32), Value>>,
}

impl ValueCache {
    pub fn get(&self, position: CellPosition) -> Option<&Value> {
        self.sheets
            .get(&position.sheet)?
            .get(&(position.col, position.row))
    }

    /// Store `value`, returning the previous one. Storing `Empty` removes the entry.
    pub fn insert(&mut self, position: CellPosition, value: Value) -> Option<Value> {
        if value.is_empty() {
            return self.remove(position);
        }
        self.sheets
            .entry(position.sheet)
            .or_default()
            .insert((position.col, position.row), value)
    }

    pub fn remove(&mut self, position: CellPosition) -> Option<Value> {
        let sheet = self.sheets.get_mut(&position.sheet)?;
        let previous = sheet.remove(&(position.col, position.row));
        if sheet.is_empty() {
            self.sheets.remove(&position.sheet);
        }
        previous
    }

    /// Stored values inside `bbox`, column by column.
    pub fn values_in(&self, bbox: &BoundingBox) -> Vec<&Value> {
        let Some(sheet) = self.sheets.get(&bbox.sheet) else {
            return Vec::new();
        };
        let zone = bbox.zone;
        let mut values = Vec::new();
        let mut col = zone.left;
        // Jump straight to the next populated column instead of walking empty ones.
        while let Some((&(found, _), _)) = sheet.range((col, zone.top)..).next() {
            if found > zone.right {
                break;
            }
            values.extend(sheet.range((found, zone.top)..=(found, zone.bottom)).map(|(_, v)| v));
            match found.checked_add(1) {
                Some(next) => col = next,
                None => break,
            }
        }
        values
    }

    pub fn len(&self) -> usize {
        self.sheets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sheets.clear();
    }
}
