//! Rectangular ranges within a sheet.

use std::collections::BTreeSet;
use std::fmt;

use gridcalc_engine::engine::CellRef;
use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Identifies a sheet within a workbook.
pub type SheetId = u32;

/// Stable identity of a stored cell, independent of where it currently sits.
pub type CellId = u64;

/// A cell address. Columns and rows are zero-based.
///
/// Ordering is (sheet, col, row), so sorted positions come out as column runs.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPosition {
    pub sheet: SheetId,
    pub col: u32,
    pub row: u32,
}

impl CellPosition {
    pub fn new(sheet: SheetId, col: u32, row: u32) -> CellPosition {
        CellPosition { sheet, col, row }
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = CellRef::new(self.col as usize, self.row as usize);
        write!(f, "#{}!{}", self.sheet, cell)
    }
}

/// An inclusive rectangle of rows and columns. `top <= bottom`, `left <= right`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Zone {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Zone {
    pub fn new(top: u32, left: u32, bottom: u32, right: u32) -> Zone {
        debug_assert!(top <= bottom && left <= right, "inverted zone");
        Zone {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Zone spanning two corners given in any order.
    pub fn from_corners(a: (u32, u32), b: (u32, u32)) -> Zone {
        let (col_a, row_a) = a;
        let (col_b, row_b) = b;
        Zone::new(
            row_a.min(row_b),
            col_a.min(col_b),
            row_a.max(row_b),
            col_a.max(col_b),
        )
    }

    pub fn cell(col: u32, row: u32) -> Zone {
        Zone::new(row, col, row, col)
    }

    pub fn rows(&self) -> u64 {
        u64::from(self.bottom - self.top) + 1
    }

    pub fn cols(&self) -> u64 {
        u64::from(self.right - self.left) + 1
    }

    /// Number of cells covered.
    pub fn area(&self) -> u64 {
        self.rows() * self.cols()
    }

    pub fn is_single_cell(&self) -> bool {
        self.top == self.bottom && self.left == self.right
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        (self.left..=self.right).contains(&col) && (self.top..=self.bottom).contains(&row)
    }

    pub fn contains_zone(&self, other: &Zone) -> bool {
        self.top <= other.top
            && self.left <= other.left
            && self.bottom >= other.bottom
            && self.right >= other.right
    }

    pub fn intersects(&self, other: &Zone) -> bool {
        self.top <= other.bottom
            && other.top <= self.bottom
            && self.left <= other.right
            && other.left <= self.right
    }

    pub fn intersection(&self, other: &Zone) -> Option<Zone> {
        if !self.intersects(other) {
            return None;
        }
        Some(Zone::new(
            self.top.max(other.top),
            self.left.max(other.left),
            self.bottom.min(other.bottom),
            self.right.min(other.right),
        ))
    }

    /// The parts of `self` not covered by `other`: at most four disjoint zones
    /// (full-width bands above and below, then the left and right sides).
    pub fn subtract(&self, other: &Zone) -> Vec<Zone> {
        let Some(hole) = self.intersection(other) else {
            return vec![*self];
        };
        let mut pieces = Vec::with_capacity(4);
        if hole.top > self.top {
            pieces.push(Zone::new(self.top, self.left, hole.top - 1, self.right));
        }
        if hole.bottom < self.bottom {
            pieces.push(Zone::new(hole.bottom + 1, self.left, self.bottom, self.right));
        }
        if hole.left > self.left {
            pieces.push(Zone::new(hole.top, self.left, hole.bottom, hole.left - 1));
        }
        if hole.right < self.right {
            pieces.push(Zone::new(hole.top, hole.right + 1, hole.bottom, self.right));
        }
        pieces
    }

    /// Union of two zones when it is itself a rectangle of exactly their cells.
    pub fn merge(&self, other: &Zone) -> Option<Zone> {
        let same_cols = self.left == other.left && self.right == other.right;
        let same_rows = self.top == other.top && self.bottom == other.bottom;
        let vertical = same_cols
            && (self.bottom.checked_add(1) == Some(other.top)
                || other.bottom.checked_add(1) == Some(self.top));
        let horizontal = same_rows
            && (self.right.checked_add(1) == Some(other.left)
                || other.right.checked_add(1) == Some(self.left));
        if vertical || horizontal {
            Some(Zone::new(
                self.top.min(other.top),
                self.left.min(other.left),
                self.bottom.max(other.bottom),
                self.right.max(other.right),
            ))
        } else {
            None
        }
    }

    /// Cells of the zone, column by column.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.left..=self.right).flat_map(move |col| (self.top..=self.bottom).map(move |row| (col, row)))
    }

    /// R-tree envelope, ordered (row, col).
    pub(crate) fn envelope(&self) -> AABB<[i64; 2]> {
        AABB::from_corners(
            [i64::from(self.top), i64::from(self.left)],
            [i64::from(self.bottom), i64::from(self.right)],
        )
    }

    /// Envelope grown by one cell on every side, for finding touching neighbours.
    pub(crate) fn neighbour_envelope(&self) -> AABB<[i64; 2]> {
        AABB::from_corners(
            [i64::from(self.top) - 1, i64::from(self.left) - 1],
            [i64::from(self.bottom) + 1, i64::from(self.right) + 1],
        )
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = CellRef::new(self.left as usize, self.top as usize);
        if self.is_single_cell() {
            return write!(f, "{start}");
        }
        let end = CellRef::new(self.right as usize, self.bottom as usize);
        write!(f, "{start}:{end}")
    }
}

/// A zone on a particular sheet.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundingBox {
    pub sheet: SheetId,
    pub zone: Zone,
}

impl BoundingBox {
    pub fn new(sheet: SheetId, zone: Zone) -> BoundingBox {
        BoundingBox { sheet, zone }
    }

    pub fn cell(position: CellPosition) -> BoundingBox {
        BoundingBox::new(position.sheet, Zone::cell(position.col, position.row))
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.sheet == other.sheet && self.zone.intersects(&other.zone)
    }

    pub fn contains(&self, position: CellPosition) -> bool {
        self.sheet == position.sheet && self.zone.contains(position.col, position.row)
    }

    pub fn top_left(&self) -> CellPosition {
        CellPosition::new(self.sheet, self.zone.left, self.zone.top)
    }

    /// Cells of the box, column by column.
    pub fn positions(&self) -> impl Iterator<Item = CellPosition> + '_ {
        self.zone
            .cells()
            .map(move |(col, row)| CellPosition::new(self.sheet, col, row))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}", self.sheet, self.zone)
    }
}

/// Merge scattered positions into rectangles.
///
/// Positions are grouped into vertical runs per column, then runs with the
/// same row span in neighbouring columns are joined.
pub fn merge_positions(positions: impl IntoIterator<Item = CellPosition>) -> Vec<BoundingBox> {
    let sorted: BTreeSet<CellPosition> = positions.into_iter().collect();

    let mut runs: Vec<BoundingBox> = Vec::new();
    for position in sorted {
        if let Some(last) = runs.last_mut()
            && last.sheet == position.sheet
            && last.zone.left == position.col
            && last.zone.bottom.checked_add(1) == Some(position.row)
        {
            last.zone.bottom = position.row;
            continue;
        }
        runs.push(BoundingBox::cell(position));
    }

    runs.sort_unstable_by_key(|b| (b.sheet, b.zone.top, b.zone.bottom, b.zone.left));
    let mut merged: Vec<BoundingBox> = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(last) = merged.last_mut()
            && last.sheet == run.sheet
            && last.zone.top == run.zone.top
            && last.zone.bottom == run.zone.bottom
            && last.zone.right.checked_add(1) == Some(run.zone.left)
        {
            last.zone.right = run.zone.right;
            continue;
        }
        merged.push(run);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn area(zones: &[Zone]) -> u64 {
        zones.iter().map(Zone::area).sum()
    }

    #[test]
    fn test_intersection_and_containment() {
        let a = Zone::new(0, 0, 9, 3);
        let b = Zone::new(5, 2, 20, 8);
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b), Some(Zone::new(5, 2, 9, 3)));
        assert!(!a.contains_zone(&b));
        assert!(a.contains_zone(&Zone::cell(1, 1)));
        assert!(!a.intersects(&Zone::new(10, 0, 10, 0)));
    }

    #[test]
    fn test_subtract_middle_leaves_four_pieces() {
        let outer = Zone::new(0, 0, 4, 4);
        let pieces = outer.subtract(&Zone::new(1, 1, 3, 3));
        assert_eq!(pieces.len(), 4);
        assert_eq!(area(&pieces), 25 - 9);
        for (i, a) in pieces.iter().enumerate() {
            for b in &pieces[i + 1..] {
                assert!(!a.intersects(b));
            }
        }
    }

    #[test]
    fn test_subtract_disjoint_and_covering() {
        let zone = Zone::new(0, 0, 1, 1);
        assert_eq!(zone.subtract(&Zone::cell(5, 5)), vec![zone]);
        assert!(zone.subtract(&Zone::new(0, 0, 3, 3)).is_empty());
    }

    #[test]
    fn test_merge_requires_alignment() {
        let a = Zone::new(0, 0, 2, 0);
        assert_eq!(a.merge(&Zone::new(3, 0, 5, 0)), Some(Zone::new(0, 0, 5, 0)));
        assert_eq!(a.merge(&Zone::new(0, 1, 2, 1)), Some(Zone::new(0, 0, 2, 1)));
        assert_eq!(a.merge(&Zone::new(3, 1, 5, 1)), None);
        assert_eq!(a.merge(&Zone::new(4, 0, 5, 0)), None);
    }

    #[test]
    fn test_merge_positions_builds_rectangles() {
        let positions = (0..3)
            .flat_map(|col| (0..4).map(move |row| CellPosition::new(0, col, row)))
            .chain([CellPosition::new(0, 7, 7), CellPosition::new(1, 0, 0)]);
        let boxes = merge_positions(positions);
        assert_eq!(
            boxes,
            vec![
                BoundingBox::new(0, Zone::new(0, 0, 3, 2)),
                BoundingBox::new(0, Zone::cell(7, 7)),
                BoundingBox::new(1, Zone::cell(0, 0)),
            ]
        );
    }

    #[test]
    fn test_box_positions_are_column_major() {
        let b = BoundingBox::new(2, Zone::new(0, 0, 1, 1));
        let cells: Vec<_> = b.positions().map(|p| (p.col, p.row)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(b.to_string(), "#2!A1:B2");
    }
}
