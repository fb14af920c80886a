//! Reference workbook: cells on named sheets, Rhai formulas and row/column edits.

mod cell;
mod formula;
mod ops;
mod state;
mod table;

pub use cell::{Cell, CellContent};
pub use formula::{CompiledFormula, RhaiExecutor};
pub use state::{DEFAULT_SHEET_NAME, Workbook};
pub use table::CellTable;
