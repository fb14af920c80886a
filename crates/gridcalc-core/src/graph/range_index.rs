//! Spatial index from "formula at P reads range B" to P.
//!
//! One R-tree per sheet; stabbing queries with a changed box return every
//! formula position whose stored box intersects it.

use std::collections::{HashMap, HashSet};

use rstar::{AABB, RTree, RTreeObject};

use super::zone::{BoundingBox, CellPosition, SheetId, Zone};

#[derive(Clone, Copy, Debug, PartialEq)]
struct IndexEntry {
    zone: Zone,
    formula: CellPosition,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.zone.envelope()
    }
}

#[derive(Debug, Default)]
pub struct RangeDependencyIndex {
    trees: HashMap<SheetId, RTree<IndexEntry>>,
    /// Boxes each formula position owns, so removal never scans the trees.
    owned: HashMap<CellPosition, Vec<BoundingBox>>,
    entries: usize,
}

impl RangeDependencyIndex {
    pub fn new() -> RangeDependencyIndex {
        RangeDependencyIndex::default()
    }

    /// Record that the formula at `formula` reads each of `boxes`. Duplicate
    /// boxes are stored as separate edges.
    pub fn insert(&mut self, formula: CellPosition, boxes: &[BoundingBox]) {
        if boxes.is_empty() {
            return;
        }
        for bbox in boxes {
            self.trees.entry(bbox.sheet).or_default().insert(IndexEntry {
                zone: bbox.zone,
                formula,
            });
        }
        self.entries += boxes.len();
        self.owned.entry(formula).or_default().extend_from_slice(boxes);
    }

    /// Drop every edge owned by the formula at `formula`.
    pub fn remove_all(&mut self, formula: CellPosition) {
        let Some(boxes) = self.owned.remove(&formula) else {
            return;
        };
        for bbox in boxes {
            let Some(tree) = self.trees.get_mut(&bbox.sheet) else {
                continue;
            };
            let entry = IndexEntry {
                zone: bbox.zone,
                formula,
            };
            if tree.remove(&entry).is_some() {
                self.entries -= 1;
            }
            if tree.size() == 0 {
                self.trees.remove(&bbox.sheet);
            }
        }
    }

    /// Formula positions reading any of `changed`, each reported once.
    pub fn query(&self, changed: &[BoundingBox]) -> HashSet<CellPosition> {
        let mut found = HashSet::new();
        for bbox in changed {
            let Some(tree) = self.trees.get(&bbox.sheet) else {
                continue;
            };
            found.extend(
                tree.locate_in_envelope_intersecting(&bbox.zone.envelope())
                    .map(|e| e.formula),
            );
        }
        found
    }

    /// Boxes read by the formula at `formula`.
    pub fn dependencies_of(&self, formula: CellPosition) -> &[BoundingBox] {
        self.owned.get(&formula).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every stored edge, sorted.
    pub fn entries(&self) -> Vec<(CellPosition, BoundingBox)> {
        let mut all: Vec<(CellPosition, BoundingBox)> = self
            .trees
            .iter()
            .flat_map(|(sheet, tree)| {
                tree.iter()
                    .map(|e| (e.formula, BoundingBox::new(*sheet, e.zone)))
            })
            .collect();
        all.sort_unstable();
        all
    }

    /// Replace the whole index with `edges`, bulk loading each sheet's tree.
    pub fn rebuild(&mut self, edges: impl IntoIterator<Item = (CellPosition, Vec<BoundingBox>)>) {
        let mut per_sheet: HashMap<SheetId, Vec<IndexEntry>> = HashMap::new();
        self.owned.clear();
        self.entries = 0;
        for (formula, boxes) in edges {
            if boxes.is_empty() {
                continue;
            }
            for bbox in &boxes {
                per_sheet.entry(bbox.sheet).or_default().push(IndexEntry {
                    zone: bbox.zone,
                    formula,
                });
            }
            self.entries += boxes.len();
            self.owned.entry(formula).or_default().extend(boxes);
        }
        self.trees = per_sheet
            .into_iter()
            .map(|(sheet, entries)| (sheet, RTree::bulk_load(entries)))
            .collect();
        log::debug!(
            "range index rebuilt: {} edges over {} sheets",
            self.entries,
            self.trees.len()
        );
    }

    /// Number of stored edges.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn clear(&mut self) {
        self.trees.clear();
        self.owned.clear();
        self.entries = 0;
    }
}
