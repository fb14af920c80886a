//! Dependency tracking: zones, recompute sets and the range/column indexes.

mod column_index;
mod dependency_index;
mod propagate;
mod range_index;
mod recompute_set;
mod shape;
mod zone;

pub use column_index::ColumnIntervalIndex;
pub use dependency_index::DependencyIndex;
pub use propagate::expand;
pub use range_index::RangeDependencyIndex;
pub use recompute_set::RecomputeSet;
pub use shape::{DependencyShape, ShapeId, ShapeInterner};
pub use zone::{BoundingBox, CellId, CellPosition, SheetId, Zone, merge_positions};
