//! gridcalc-core - Incremental recalculation core + in-memory workbook.
//!
//! - [`graph`] - zones, recompute sets and the dependency indexes
//! - [`scheduler`] - the evaluation scheduler and the collaborator traits it drives
//! - [`document`] - a reference [`Workbook`] backed by Rhai formulas

pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod scheduler;

pub use config::RecalcConfig;
pub use document::Workbook;
pub use error::{GridcalcError, Result};
pub use graph::{BoundingBox, CellId, CellPosition, RecomputeSet, SheetId, Zone};
pub use scheduler::{Change, RecalcStats, Scheduler, SchedulerState};

pub use gridcalc_engine::engine::{CellError, CellRef, ErrorKind, Value};
