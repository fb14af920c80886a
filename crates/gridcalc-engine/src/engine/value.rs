//! Evaluated cell values and cell-level errors.
//!
//! Data-level problems (bad formulas, cycles, dangling references) never abort
//! a recalculation; they become a [`Value::Error`] on the affected cell.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a cell-level error.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The cell takes part in a cycle found while evaluating a pass.
    CircularDependency,
    /// The cell was still pending after the last allowed pass.
    CircularDependencyUnresolved,
    /// A reference points at a deleted sheet, row or column, or out of bounds.
    InvalidReference,
    /// The formula failed to compile or raised an error while executing.
    Eval,
}

impl ErrorKind {
    /// Short code shown in place of a value.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::CircularDependency => "#CYCLE!",
            ErrorKind::CircularDependencyUnresolved => "#UNRESOLVED!",
            ErrorKind::InvalidReference => "#REF!",
            ErrorKind::Eval => "#ERR!",
        }
    }
}

/// An error value carried by a cell.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}{}", .kind.code(), message_suffix(.message))]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: String,
}

fn message_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(" {message}")
    }
}

impl CellError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CellError {
        CellError {
            kind,
            message: message.into(),
        }
    }

    pub fn circular() -> CellError {
        CellError::new(ErrorKind::CircularDependency, "circular reference")
    }

    pub fn unresolved() -> CellError {
        CellError::new(
            ErrorKind::CircularDependencyUnresolved,
            "dependencies did not settle",
        )
    }

    pub fn invalid_reference() -> CellError {
        CellError::new(ErrorKind::InvalidReference, "")
    }

    pub fn eval(message: impl Into<String>) -> CellError {
        CellError::new(ErrorKind::Eval, message)
    }
}

/// The evaluated value of a cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(CellError),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Equality used for change detection: NaN compares equal to NaN so a formula
    /// that keeps producing NaN is not seen as changing forever.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}
