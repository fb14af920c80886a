//! Formula engine API.
//!
//! - [`CellRef`], [`RangeRef`] - Cell and range references (A1 notation ↔ row/col indices)
//! - [`Value`], [`CellError`] - Evaluated cell values and cell-level errors
//! - [`extract_dependencies`] - Parse the references a formula reads
//! - [`prepare_formula`] - Transform formulas for Rhai evaluation
//! - [`shift_formula_references`] - Rewrite references after row/column edits
//! - [`create_engine`] - Create a Rhai engine with built-in functions
//! - [`format_value`] - Format values for display

mod cell_ref;
mod deps;
mod eval;
mod format;
mod preprocess;
mod value;

pub use cell_ref::{CellRef, RangeRef, RefKind, letters_to_col, quote_sheet_name};
pub use deps::{ReferenceMatch, extract_dependencies, scan_references};
pub use eval::{
    CompileError, compile_script, create_engine, dynamic_to_value, eval_with_bindings,
    value_to_dynamic, values_to_array,
};
pub use format::{format_number, format_value};
pub use preprocess::{
    INVALID_REFERENCE, PreparedFormula, ShiftOperation, binding_name, prepare_formula,
    shift_formula_references,
};
pub use value::{CellError, ErrorKind, Value};

pub use rhai::{AST, Dynamic, Engine};
