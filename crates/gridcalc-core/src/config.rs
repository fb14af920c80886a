//! Recalculation settings.

use serde::{Deserialize, Serialize};

/// Default number of evaluation passes per recalculation.
pub const DEFAULT_MAX_CYCLE: usize = 1;
/// Default sheet height (rows `0..DEFAULT_MAX_ROWS`).
pub const DEFAULT_MAX_ROWS: u32 = 1_048_576;
/// Default sheet width (columns `0..DEFAULT_MAX_COLS`).
pub const DEFAULT_MAX_COLS: u32 = 16_384;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalcConfig {
    /// Passes allowed before still-pending positions are reported unresolved.
    pub max_cycle: usize,
    /// Route single-column dependencies through the column interval index.
    pub column_index: bool,
    pub max_rows: u32,
    pub max_cols: u32,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        RecalcConfig {
            max_cycle: DEFAULT_MAX_CYCLE,
            column_index: true,
            max_rows: DEFAULT_MAX_ROWS,
            max_cols: DEFAULT_MAX_COLS,
        }
    }
}

impl RecalcConfig {
    /// Last valid row index.
    pub fn last_row(&self) -> u32 {
        self.max_rows.saturating_sub(1)
    }

    /// Last valid column index.
    pub fn last_col(&self) -> u32 {
        self.max_cols.saturating_sub(1)
    }

    /// At least one pass always runs.
    pub(crate) fn passes(&self) -> usize {
        self.max_cycle.max(1)
    }
}
