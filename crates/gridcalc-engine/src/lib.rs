//! gridcalc_engine - Formula language for the recalculation core (Rhai formulas,
//! reference extraction, preprocessing, builtins).

pub(crate) mod builtins;
pub mod engine;
