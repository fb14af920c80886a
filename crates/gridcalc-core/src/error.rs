//! Error types for gridcalc core.
//!
//! Only contract violations surface here. Data-level problems (bad formulas,
//! cycles, dangling references) are [`CellError`](gridcalc_engine::engine::CellError)
//! values stored on the affected cell.

use thiserror::Error;

use crate::graph::CellId;

/// Errors returned by the workbook API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridcalcError {
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Sheet already exists: {0}")]
    DuplicateSheet(String),

    #[error("Invalid sheet name: {0:?}")]
    InvalidSheetName(String),

    #[error("Cannot remove the last sheet")]
    LastSheet,

    #[error("Invalid cell reference: {0}")]
    InvalidCellRef(String),

    #[error("Cell {0} is outside the sheet bounds")]
    OutOfBounds(String),

    #[error("No cell with id {0}")]
    UnknownCellId(CellId),
}

pub type Result<T> = std::result::Result<T, GridcalcError>;
