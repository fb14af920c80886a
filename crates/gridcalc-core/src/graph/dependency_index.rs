//! Combined dependency index used by the scheduler.
//!
//! Single-column boxes go to the [`ColumnIntervalIndex`] when it is enabled;
//! everything else goes to the [`RangeDependencyIndex`]. Queries return the
//! union of both.

use std::collections::{HashMap, HashSet};

use super::column_index::ColumnIntervalIndex;
use super::range_index::RangeDependencyIndex;
use super::zone::{BoundingBox, CellPosition};

#[derive(Debug)]
pub struct DependencyIndex {
    ranges: RangeDependencyIndex,
    columns: Option<ColumnIntervalIndex>,
    column_edges: HashMap<CellPosition, Vec<BoundingBox>>,
}

impl DependencyIndex {
    /// `last_row` is the last row of a sheet. `column_index` enables the
    /// interval accelerator for single-column boxes.
    pub fn new(last_row: u32, column_index: bool) -> DependencyIndex {
        DependencyIndex {
            ranges: RangeDependencyIndex::new(),
            columns: column_index.then(|| ColumnIntervalIndex::new(last_row)),
            column_edges: HashMap::new(),
        }
    }

    /// Record every box the formula at `formula` reads.
    pub fn insert(&mut self, formula: CellPosition, boxes: &[BoundingBox]) {
        let Some(columns) = self.columns.as_mut() else {
            self.ranges.insert(formula, boxes);
            return;
        };
        let (single, wide): (Vec<BoundingBox>, Vec<BoundingBox>) =
            boxes.iter().partition(|b| ColumnIntervalIndex::accepts(b));
        for bbox in &single {
            columns.insert(formula, bbox);
        }
        if !single.is_empty() {
            self.column_edges.entry(formula).or_default().extend(single);
        }
        self.ranges.insert(formula, &wide);
    }

    /// Drop every edge owned by the formula at `formula`.
    pub fn remove_all(&mut self, formula: CellPosition) {
        self.ranges.remove_all(formula);
        if let (Some(columns), Some(boxes)) =
            (self.columns.as_mut(), self.column_edges.remove(&formula))
        {
            for bbox in &boxes {
                columns.remove(formula, bbox);
            }
        }
    }

    /// Formula positions reading any of `changed`.
    pub fn query(&self, changed: &[BoundingBox]) -> HashSet<CellPosition> {
        let mut found = self.ranges.query(changed);
        if let Some(columns) = &self.columns {
            for bbox in changed {
                found.extend(columns.query(bbox));
            }
        }
        found
    }

    /// Boxes read by the formula at `formula`, in no particular order.
    pub fn dependencies_of(&self, formula: CellPosition) -> Vec<BoundingBox> {
        let mut boxes = self.ranges.dependencies_of(formula).to_vec();
        if let Some(single) = self.column_edges.get(&formula) {
            boxes.extend_from_slice(single);
        }
        boxes
    }

    /// Apply pending column interval changes.
    pub fn flush(&mut self) {
        if let Some(columns) = self.columns.as_mut() {
            columns.flush();
        }
    }

    /// Replace every edge. Interned shapes are dropped and rebuilt.
    pub fn rebuild(&mut self, edges: Vec<(CellPosition, Vec<BoundingBox>)>) {
        self.column_edges.clear();
        let Some(columns) = self.columns.as_mut() else {
            self.ranges.rebuild(edges);
            return;
        };
        columns.clear();
        let mut wide_edges = Vec::with_capacity(edges.len());
        for (formula, boxes) in edges {
            let (single, wide): (Vec<BoundingBox>, Vec<BoundingBox>) =
                boxes.into_iter().partition(ColumnIntervalIndex::accepts);
            for bbox in &single {
                columns.insert(formula, bbox);
            }
            if !single.is_empty() {
                self.column_edges.insert(formula, single);
            }
            wide_edges.push((formula, wide));
        }
        columns.flush();
        self.ranges.rebuild(wide_edges);
        log::debug!(
            "column index rebuilt: {} intervals, {} shapes",
            columns.len(),
            columns.shape_count()
        );
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.column_edges.clear();
        if let Some(columns) = self.columns.as_mut() {
            columns.clear();
        }
    }

    /// Number of stored edges across both indexes.
    pub fn len(&self) -> usize {
        self.ranges.len() + self.column_edges.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ranges(&self) -> &RangeDependencyIndex {
        &self.ranges
    }

    pub fn columns(&self) -> Option<&ColumnIntervalIndex> {
        self.columns.as_ref()
    }
}
