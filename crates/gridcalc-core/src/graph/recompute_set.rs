//! Sparse set of grid positions stored as disjoint rectangles.
//!
//! Used both for "cells whose output changed" and "cells pending evaluation".
//! Every operation works on zones, so a pending fill-down of a million rows is
//! one entry, not a million.
//!
//! Multiplicity is not tracked. A consumer that iterates while another party
//! adds, removes and re-adds the same position may see it twice.

use std::collections::HashMap;

use rstar::{AABB, RTree, RTreeObject};

use super::zone::{BoundingBox, CellPosition, SheetId, Zone};

#[derive(Clone, Copy, Debug, PartialEq)]
struct ZoneEntry(Zone);

impl RTreeObject for ZoneEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.0.envelope()
    }
}

fn point(col: u32, row: u32) -> AABB<[i64; 2]> {
    AABB::from_point([i64::from(row), i64::from(col)])
}

#[derive(Clone, Debug, Default)]
pub struct RecomputeSet {
    sheets: HashMap<SheetId, RTree<ZoneEntry>>,
    cells: u64,
}

impl RecomputeSet {
    pub fn new() -> RecomputeSet {
        RecomputeSet::default()
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = BoundingBox>) -> RecomputeSet {
        let mut set = RecomputeSet::new();
        for b in boxes {
            set.add(b);
        }
        set
    }

    /// Number of positions in the set.
    pub fn len(&self) -> u64 {
        self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells == 0
    }

    pub fn clear(&mut self) {
        self.sheets.clear();
        self.cells = 0;
    }

    /// Move the contents out, leaving the set empty.
    pub fn take(&mut self) -> RecomputeSet {
        std::mem::take(self)
    }

    pub fn add_position(&mut self, position: CellPosition) {
        self.add(BoundingBox::cell(position));
    }

    /// Add every position of `bbox`. Only the part not already present is
    /// stored, merged with aligned neighbours.
    pub fn add(&mut self, bbox: BoundingBox) {
        let tree = self.sheets.entry(bbox.sheet).or_default();
        let overlapping: Vec<Zone> = tree
            .locate_in_envelope_intersecting(&bbox.zone.envelope())
            .map(|e| e.0)
            .collect();

        let mut pieces = vec![bbox.zone];
        for existing in &overlapping {
            pieces = pieces.iter().flat_map(|p| p.subtract(existing)).collect();
            if pieces.is_empty() {
                return;
            }
        }

        for piece in pieces {
            self.cells += piece.area();
            insert_merged(tree, piece);
        }
    }

    pub fn remove_position(&mut self, position: CellPosition) {
        self.remove(BoundingBox::cell(position));
    }

    /// Remove every position of `bbox`, splitting stored zones that straddle it.
    pub fn remove(&mut self, bbox: BoundingBox) {
        let Some(tree) = self.sheets.get_mut(&bbox.sheet) else {
            return;
        };
        let overlapping: Vec<ZoneEntry> = tree
            .locate_in_envelope_intersecting(&bbox.zone.envelope())
            .copied()
            .collect();

        for entry in overlapping {
            tree.remove(&entry);
            if let Some(hole) = entry.0.intersection(&bbox.zone) {
                self.cells -= hole.area();
            }
            for piece in entry.0.subtract(&bbox.zone) {
                tree.insert(ZoneEntry(piece));
            }
        }
        if tree.size() == 0 {
            self.sheets.remove(&bbox.sheet);
        }
    }

    /// Add every position of `other`.
    pub fn extend(&mut self, other: &RecomputeSet) {
        for bbox in other.zones() {
            self.add(bbox);
        }
    }

    pub fn contains(&self, position: CellPosition) -> bool {
        self.sheets.get(&position.sheet).is_some_and(|tree| {
            tree.locate_in_envelope_intersecting(&point(position.col, position.row))
                .next()
                .is_some()
        })
    }

    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        self.sheets.get(&bbox.sheet).is_some_and(|tree| {
            tree.locate_in_envelope_intersecting(&bbox.zone.envelope())
                .next()
                .is_some()
        })
    }

    /// Positions of the set that fall inside `bbox`.
    pub fn positions_in(&self, bbox: &BoundingBox) -> Vec<CellPosition> {
        let Some(tree) = self.sheets.get(&bbox.sheet) else {
            return Vec::new();
        };
        let mut zones: Vec<Zone> = tree
            .locate_in_envelope_intersecting(&bbox.zone.envelope())
            .filter_map(|e| e.0.intersection(&bbox.zone))
            .collect();
        zones.sort_unstable();
        zones
            .iter()
            .flat_map(|z| z.cells())
            .map(|(col, row)| CellPosition::new(bbox.sheet, col, row))
            .collect()
    }

    /// The parts of `bbox` not in the set.
    pub fn uncovered(&self, bbox: &BoundingBox) -> Vec<BoundingBox> {
        let Some(tree) = self.sheets.get(&bbox.sheet) else {
            return vec![*bbox];
        };
        let mut pieces = vec![bbox.zone];
        for existing in tree.locate_in_envelope_intersecting(&bbox.zone.envelope()) {
            pieces = pieces.iter().flat_map(|p| p.subtract(&existing.0)).collect();
            if pieces.is_empty() {
                break;
            }
        }
        pieces
            .into_iter()
            .map(|zone| BoundingBox::new(bbox.sheet, zone))
            .collect()
    }

    /// Stored zones, sorted.
    pub fn zones(&self) -> Vec<BoundingBox> {
        let mut boxes: Vec<BoundingBox> = self
            .sheets
            .iter()
            .flat_map(|(sheet, tree)| tree.iter().map(|e| BoundingBox::new(*sheet, e.0)))
            .collect();
        boxes.sort_unstable();
        boxes
    }

    /// Every position, zone by zone.
    pub fn iter(&self) -> impl Iterator<Item = CellPosition> {
        self.zones()
            .into_iter()
            .flat_map(|b| b.positions().collect::<Vec<_>>())
    }

    /// Some position of the set, if any.
    pub fn first(&self) -> Option<CellPosition> {
        self.sheets.iter().find_map(|(sheet, tree)| {
            tree.iter()
                .next()
                .map(|e| CellPosition::new(*sheet, e.0.left, e.0.top))
        })
    }

    /// Remove and return some position of the set.
    pub fn pop(&mut self) -> Option<CellPosition> {
        let position = self.first()?;
        self.remove_position(position);
        Some(position)
    }
}

/// Insert `zone` (disjoint from everything in `tree`), absorbing any stored
/// zone it lines up with.
fn insert_merged(tree: &mut RTree<ZoneEntry>, mut zone: Zone) {
    loop {
        let neighbour = tree
            .locate_in_envelope_intersecting(&zone.neighbour_envelope())
            .find_map(|e| zone.merge(&e.0).map(|merged| (*e, merged)));
        match neighbour {
            Some((entry, merged)) => {
                tree.remove(&entry);
                zone = merged;
            }
            None => break,
        }
    }
    tree.insert(ZoneEntry(zone));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bx(sheet: SheetId, top: u32, left: u32, bottom: u32, right: u32) -> BoundingBox {
        BoundingBox::new(sheet, Zone::new(top, left, bottom, right))
    }

    #[test]
    fn test_add_merges_aligned_neighbours() {
        let mut set = RecomputeSet::new();
        set.add(bx(0, 0, 0, 4, 0));
        set.add(bx(0, 5, 0, 9, 0));
        set.add(bx(0, 0, 1, 9, 1));
        assert_eq!(set.zones(), vec![bx(0, 0, 0, 9, 1)]);
        assert_eq!(set.len(), 20);
    }

    #[test]
    fn test_add_overlapping_counts_once() {
        let mut set = RecomputeSet::new();
        set.add(bx(0, 0, 0, 9, 9));
        set.add(bx(0, 5, 5, 14, 14));
        assert_eq!(set.len(), 100 + 100 - 25);
        assert!(set.contains(CellPosition::new(0, 14, 14)));
        assert!(!set.contains(CellPosition::new(0, 0, 14)));
    }

    #[test]
    fn test_remove_splits_zones() {
        let mut set = RecomputeSet::new();
        set.add(bx(0, 0, 0, 9, 0));
        set.remove_position(CellPosition::new(0, 0, 4));
        assert_eq!(set.len(), 9);
        assert!(!set.contains(CellPosition::new(0, 0, 4)));
        assert_eq!(set.zones(), vec![bx(0, 0, 0, 3, 0), bx(0, 5, 0, 9, 0)]);
    }

    #[test]
    fn test_add_then_remove_is_empty() {
        let mut set = RecomputeSet::new();
        let b = bx(3, 10, 10, 1_000_000, 12);
        set.add(b);
        set.remove(b);
        assert!(set.is_empty());
        assert!(set.zones().is_empty());
        assert!(!set.intersects(&b));
    }

    #[test]
    fn test_sheets_are_independent() {
        let mut set = RecomputeSet::new();
        set.add(bx(0, 0, 0, 0, 0));
        assert!(!set.contains(CellPosition::new(1, 0, 0)));
        set.remove(bx(1, 0, 0, 5, 5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_uncovered_and_positions_in() {
        let set = RecomputeSet::from_boxes([bx(0, 0, 0, 1, 0)]);
        let query = bx(0, 0, 0, 3, 0);
        assert_eq!(set.uncovered(&query), vec![bx(0, 2, 0, 3, 0)]);
        assert_eq!(
            set.positions_in(&query),
            vec![CellPosition::new(0, 0, 0), CellPosition::new(0, 0, 1)]
        );
    }

    #[test]
    fn test_pop_drains_everything() {
        let mut set = RecomputeSet::from_boxes([bx(0, 0, 0, 2, 1), bx(1, 4, 4, 4, 4)]);
        let mut seen = Vec::new();
        while let Some(p) = set.pop() {
            seen.push(p);
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
        assert!(set.is_empty());
    }

    #[test]
    fn test_iter_and_take() {
        let mut set = RecomputeSet::from_boxes([bx(0, 0, 0, 1, 1)]);
        assert_eq!(set.iter().count(), 4);
        let taken = set.take();
        assert!(set.is_empty());
        assert_eq!(taken.len(), 4);
    }
}
