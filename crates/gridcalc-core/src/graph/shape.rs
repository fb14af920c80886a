//! Canonical dependency shapes.
//!
//! A column interval entry does not name its dependent formula directly; it
//! names a shape that says where the dependent sits relative to the interval.
//! A column filled down with the same relative formula produces one shape no
//! matter how many rows it covers.

use std::collections::HashMap;

use super::zone::{CellPosition, SheetId};

/// Small integer handle to an interned [`DependencyShape`].
pub type ShapeId = u32;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum DependencyShape {
    /// Dependent is at `(interval column + col_offset, interval start + row_offset)` on `sheet`.
    Relative {
        sheet: SheetId,
        col_offset: i64,
        row_offset: i64,
    },
    /// Dependent is one fixed position whatever the interval.
    Absolute(CellPosition),
}

impl DependencyShape {
    /// The dependent position for an interval starting at `(col, start)`.
    pub fn resolve(&self, col: u32, start: u32) -> Option<CellPosition> {
        match *self {
            DependencyShape::Relative {
                sheet,
                col_offset,
                row_offset,
            } => {
                let col = u32::try_from(i64::from(col) + col_offset).ok()?;
                let row = u32::try_from(i64::from(start) + row_offset).ok()?;
                Some(CellPosition::new(sheet, col, row))
            }
            DependencyShape::Absolute(position) => Some(position),
        }
    }
}

/// Append-only interner. Ids stay valid until [`ShapeInterner::clear`].
#[derive(Debug, Default)]
pub struct ShapeInterner {
    ids: HashMap<DependencyShape, ShapeId>,
    shapes: Vec<DependencyShape>,
}

impl ShapeInterner {
    pub fn intern(&mut self, shape: DependencyShape) -> ShapeId {
        if let Some(&id) = self.ids.get(&shape) {
            return id;
        }
        let id = self.shapes.len() as ShapeId;
        self.shapes.push(shape);
        self.ids.insert(shape, id);
        id
    }

    pub fn id_of(&self, shape: &DependencyShape) -> Option<ShapeId> {
        self.ids.get(shape).copied()
    }

    pub fn get(&self, id: ShapeId) -> Option<&DependencyShape> {
        self.shapes.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.shapes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_structural() {
        let mut interner = ShapeInterner::default();
        let a = interner.intern(DependencyShape::Relative {
            sheet: 0,
            col_offset: 1,
            row_offset: 0,
        });
        let b = interner.intern(DependencyShape::Relative {
            sheet: 0,
            col_offset: 1,
            row_offset: 0,
        });
        let c = interner.intern(DependencyShape::Absolute(CellPosition::new(0, 0, 0)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let relative = DependencyShape::Relative {
            sheet: 2,
            col_offset: -1,
            row_offset: 3,
        };
        assert_eq!(relative.resolve(4, 10), Some(CellPosition::new(2, 3, 13)));
        assert_eq!(relative.resolve(0, 10), None);

        let fixed = CellPosition::new(1, 7, 7);
        assert_eq!(DependencyShape::Absolute(fixed).resolve(0, 0), Some(fixed));
    }
}
