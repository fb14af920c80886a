use std::sync::Arc;

use gridcalc_engine::engine::Value;

use super::formula::CompiledFormula;
use crate::graph::CellId;
use crate::scheduler::CellSnapshot;

/// What a cell holds once its input has been parsed.
#[derive(Clone, Debug)]
pub enum CellContent {
    Number(f64),
    Text(String),
    Formula(Arc<CompiledFormula>),
}

/// A stored cell. The id follows the cell when rows or columns move.
#[derive(Clone, Debug)]
pub struct Cell {
    pub id: CellId,
    pub content: CellContent,
}

impl Cell {
    /// The text a user would type to recreate this cell.
    pub fn to_input_string(&self) -> String {
        match &self.content {
            CellContent::Number(n) => n.to_string(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula(f) => format!("={}", f.source),
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.content, CellContent::Formula(_))
    }

    pub(crate) fn snapshot(&self) -> CellSnapshot<CompiledFormula> {
        match &self.content {
            CellContent::Number(n) => CellSnapshot::Constant(Value::Number(*n)),
            CellContent::Text(s) => CellSnapshot::Constant(Value::Text(s.clone())),
            CellContent::Formula(f) => CellSnapshot::Formula(Arc::clone(f)),
        }
    }
}

/// Raw user input, classified.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Input<'a> {
    Empty,
    Number(f64),
    Text(&'a str),
    /// Formula body without the leading `=`.
    Formula(&'a str),
}

impl<'a> Input<'a> {
    pub(crate) fn parse(input: &'a str) -> Input<'a> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Input::Empty;
        }

        if let Some(formula) = trimmed.strip_prefix('=') {
            return Input::Formula(formula);
        }

        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            return Input::Text(&trimmed[1..trimmed.len() - 1]);
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            return Input::Number(n);
        }

        Input::Text(trimmed)
    }
}
