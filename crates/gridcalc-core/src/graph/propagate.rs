//! Transitive expansion of changed boxes through the dependency index.

use super::dependency_index::DependencyIndex;
use super::recompute_set::RecomputeSet;
use super::zone::{BoundingBox, merge_positions};

/// Every formula position reachable from `seeds`, excluding the seeds.
///
/// Works in waves: each wave queries the index once with every box queued by
/// the previous one, merges the impacted positions into rectangles and queues
/// only the parts not visited yet, so no region is queried twice.
pub fn expand(index: &DependencyIndex, seeds: &[BoundingBox]) -> RecomputeSet {
    let mut visited = RecomputeSet::from_boxes(seeds.iter().copied());
    let mut queue: Vec<BoundingBox> = seeds.to_vec();
    let mut waves = 0usize;

    while !queue.is_empty() {
        waves += 1;
        let impacted = index.query(&queue);
        queue.clear();
        for bbox in merge_positions(impacted) {
            for piece in visited.uncovered(&bbox) {
                visited.add(piece);
                queue.push(piece);
            }
        }
    }

    for seed in seeds {
        visited.remove(*seed);
    }
    log::trace!(
        "expanded {} seeds to {} positions in {} waves",
        seeds.len(),
        visited.len(),
        waves
    );
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::zone::{CellPosition, Zone};
    use pretty_assertions::assert_eq;

    fn cell(col: u32, row: u32) -> BoundingBox {
        BoundingBox::cell(CellPosition::new(0, col, row))
    }

    #[test]
    fn test_expand_follows_chains() {
        let mut index = DependencyIndex::new(999, true);
        // B1 = A1, C1 = B1, D1 = C1
        index.insert(CellPosition::new(0, 1, 0), &[cell(0, 0)]);
        index.insert(CellPosition::new(0, 2, 0), &[cell(1, 0)]);
        index.insert(CellPosition::new(0, 3, 0), &[cell(2, 0)]);
        index.flush();

        let result = expand(&index, &[cell(0, 0)]);
        assert_eq!(result.zones(), vec![BoundingBox::new(0, Zone::new(0, 1, 0, 3))]);
    }

    #[test]
    fn test_expand_excludes_seeds_and_terminates_on_cycles() {
        let mut index = DependencyIndex::new(999, false);
        index.insert(CellPosition::new(0, 0, 0), &[cell(1, 0)]);
        index.insert(CellPosition::new(0, 1, 0), &[cell(0, 0)]);

        let result = expand(&index, &[cell(0, 0)]);
        assert_eq!(result.zones(), vec![cell(1, 0)]);
    }

    #[test]
    fn test_expand_merges_fill_down() {
        let mut index = DependencyIndex::new(999, true);
        for row in 0..500 {
            index.insert(CellPosition::new(0, 1, row), &[cell(0, row)]);
            index.insert(CellPosition::new(0, 2, row), &[cell(1, row)]);
        }
        index.flush();
        let column_a = BoundingBox::new(0, Zone::new(0, 0, 499, 0));
        let result = expand(&index, &[column_a]);
        assert_eq!(result.len(), 1_000);
        assert_eq!(result.zones(), vec![BoundingBox::new(0, Zone::new(0, 1, 499, 2))]);
    }
}
