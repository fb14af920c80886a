//! Interval index for single-column dependencies.
//!
//! Each (sheet, column) keeps a flat buffer of `[start, end, shape]` triples.
//! Inserts append; removals are recorded and applied on the next rebuild,
//! which sorts, drops removed triples, deduplicates into a scratch buffer and
//! swaps it in. The sorted buffer is then read as an implicit balanced interval
//! tree: the node for `lo..hi` is the median `(lo + hi) / 2`, and `max_end[i]`
//! holds the largest end row of the subtree rooted at `i`.

use std::collections::{BTreeMap, HashSet};

use super::shape::{DependencyShape, ShapeId, ShapeInterner};
use super::zone::{BoundingBox, CellPosition, SheetId};

type Interval = [u32; 3];

const START: usize = 0;
const END: usize = 1;
const SHAPE: usize = 2;

#[derive(Debug, Default)]
struct ColumnIntervals {
    entries: Vec<Interval>,
    scratch: Vec<Interval>,
    removed: HashSet<Interval>,
    max_end: Vec<u32>,
    dirty: bool,
}

impl ColumnIntervals {
    fn push(&mut self, interval: Interval) {
        // A pending removal means the triple is still in the buffer.
        if !self.removed.remove(&interval) {
            self.entries.push(interval);
        }
        self.dirty = true;
    }

    fn remove(&mut self, interval: Interval) {
        self.removed.insert(interval);
        self.dirty = true;
    }

    fn rebuild(&mut self) {
        if !self.dirty {
            return;
        }
        self.entries.sort_unstable();
        self.scratch.clear();
        for interval in self.entries.drain(..) {
            if self.removed.contains(&interval) || self.scratch.last() == Some(&interval) {
                continue;
            }
            self.scratch.push(interval);
        }
        std::mem::swap(&mut self.entries, &mut self.scratch);
        self.removed.clear();
        self.build_max_end();
        self.dirty = false;
    }

    fn build_max_end(&mut self) {
        let n = self.entries.len();
        self.max_end.clear();
        self.max_end.resize(n, 0);

        let mut stack = vec![(0usize, n, false)];
        while let Some((lo, hi, children_done)) = stack.pop() {
            if lo >= hi {
                continue;
            }
            let mid = lo + (hi - lo) / 2;
            if !children_done {
                stack.push((lo, hi, true));
                stack.push((lo, mid, false));
                stack.push((mid + 1, hi, false));
                continue;
            }
            let mut max = self.entries[mid][END];
            for (l, h) in [(lo, mid), (mid + 1, hi)] {
                if l < h {
                    max = max.max(self.max_end[l + (h - l) / 2]);
                }
            }
            self.max_end[mid] = max;
        }
    }

    /// Live intervals overlapping `start..=end`.
    fn overlapping(&self, start: u32, end: u32, out: &mut Vec<Interval>) {
        if self.dirty {
            out.extend(
                self.entries
                    .iter()
                    .filter(|i| i[START] <= end && i[END] >= start)
                    .filter(|i| !self.removed.contains(*i)),
            );
            return;
        }

        let mut stack = vec![(0usize, self.entries.len())];
        while let Some((lo, hi)) = stack.pop() {
            if lo >= hi {
                continue;
            }
            let mid = lo + (hi - lo) / 2;
            if self.max_end[mid] < start {
                continue;
            }
            stack.push((lo, mid));
            let interval = self.entries[mid];
            if interval[START] <= end {
                if interval[END] >= start {
                    out.push(interval);
                }
                stack.push((mid + 1, hi));
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
pub struct ColumnIntervalIndex {
    shapes: ShapeInterner,
    columns: BTreeMap<(SheetId, u32), ColumnIntervals>,
    last_row: u32,
}

impl ColumnIntervalIndex {
    /// `last_row` is the last row of a sheet; intervals spanning every row are
    /// whole-column references.
    pub fn new(last_row: u32) -> ColumnIntervalIndex {
        ColumnIntervalIndex {
            shapes: ShapeInterner::default(),
            columns: BTreeMap::new(),
            last_row,
        }
    }

    /// Whether `bbox` can be stored here.
    pub fn accepts(bbox: &BoundingBox) -> bool {
        bbox.zone.left == bbox.zone.right
    }

    fn shape_for(&self, formula: CellPosition, bbox: &BoundingBox) -> DependencyShape {
        if bbox.zone.top == 0 && bbox.zone.bottom >= self.last_row {
            return DependencyShape::Absolute(formula);
        }
        DependencyShape::Relative {
            sheet: formula.sheet,
            col_offset: i64::from(formula.col) - i64::from(bbox.zone.left),
            row_offset: i64::from(formula.row) - i64::from(bbox.zone.top),
        }
    }

    /// Record that `formula` reads the single-column box `bbox`.
    pub fn insert(&mut self, formula: CellPosition, bbox: &BoundingBox) {
        debug_assert!(Self::accepts(bbox));
        let shape = self.shape_for(formula, bbox);
        let id = self.shapes.intern(shape);
        self.columns
            .entry((bbox.sheet, bbox.zone.left))
            .or_default()
            .push([bbox.zone.top, bbox.zone.bottom, id]);
    }

    /// Forget that `formula` reads `bbox`. Applied on the next rebuild.
    pub fn remove(&mut self, formula: CellPosition, bbox: &BoundingBox) {
        let shape = self.shape_for(formula, bbox);
        let Some(id) = self.shapes.id_of(&shape) else {
            return;
        };
        if let Some(column) = self.columns.get_mut(&(bbox.sheet, bbox.zone.left)) {
            column.remove([bbox.zone.top, bbox.zone.bottom, id]);
        }
    }

    /// Rebuild every column touched since the last rebuild.
    pub fn flush(&mut self) {
        let mut rebuilt = 0usize;
        for column in self.columns.values_mut().filter(|c| c.dirty) {
            column.rebuild();
            rebuilt += 1;
        }
        self.columns.retain(|_, c| c.len() > 0);
        if rebuilt > 0 {
            log::trace!("column index: rebuilt {rebuilt} columns");
        }
    }

    /// Dependent positions whose interval overlaps `bbox`.
    ///
    /// Columns still awaiting a rebuild are scanned linearly.
    pub fn query(&self, bbox: &BoundingBox) -> Vec<CellPosition> {
        let (zone, sheet) = (bbox.zone, bbox.sheet);
        let mut hits = Vec::new();
        let mut intervals = Vec::new();
        for (&(_, col), column) in self.columns.range((sheet, zone.left)..=(sheet, zone.right)) {
            intervals.clear();
            column.overlapping(zone.top, zone.bottom, &mut intervals);
            hits.extend(intervals.iter().filter_map(|interval| {
                self.shapes
                    .get(interval[SHAPE] as ShapeId)
                    .and_then(|shape| shape.resolve(col, interval[START]))
            }));
        }
        hits
    }

    /// Number of distinct interned shapes.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Stored intervals, including ones awaiting a rebuild.
    pub fn len(&self) -> usize {
        self.columns.values().map(ColumnIntervals::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every interval and every shape.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.shapes.clear();
    }
}
