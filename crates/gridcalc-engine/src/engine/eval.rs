//! Rhai engine creation and formula evaluation.
//!
//! Creates the Rhai scripting engine with all spreadsheet built-in functions
//! registered (SUM, AVG, ...) and evaluates prepared formulas with their
//! references bound as scope variables. Also converts between cell [`Value`]s
//! and Rhai [`Dynamic`]s.

use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, Scope};
use thiserror::Error;

use super::preprocess::binding_name;
use super::value::{CellError, Value};

/// A formula that Rhai could not parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("compile error: {0}")]
pub struct CompileError(pub String);

impl From<CompileError> for CellError {
    fn from(e: CompileError) -> Self {
        CellError::eval(e.0)
    }
}

/// Create a Rhai engine with built-ins registered.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    crate::builtins::register_builtins(&mut engine);
    engine
}

/// Compile a prepared script once so it can be evaluated many times.
pub fn compile_script(engine: &Engine, script: &str) -> Result<AST, CompileError> {
    engine
        .compile(script)
        .map_err(|e| CompileError(e.to_string()))
}

/// Evaluate a compiled formula with `bindings[i]` bound to reference `i`.
pub fn eval_with_bindings(
    engine: &Engine,
    ast: &AST,
    bindings: Vec<Dynamic>,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let mut scope = Scope::with_capacity(bindings.len());
    for (index, value) in bindings.into_iter().enumerate() {
        scope.push_dynamic(binding_name(index), value);
    }
    engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast)
}

/// Convert a cell value into what a single-cell reference evaluates to.
///
/// Empty cells read as `0.0` so arithmetic on blank cells works.
/// Error values have no Rhai counterpart; callers propagate them before binding.
pub fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Empty => Dynamic::from(0.0_f64),
        Value::Number(n) => Dynamic::from(*n),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Bool(b) => Dynamic::from(*b),
        Value::Error(e) => Dynamic::from(e.to_string()),
    }
}

/// Convert the non-empty values of a range into a Rhai array.
pub fn values_to_array(values: &[Value]) -> Array {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .map(value_to_dynamic)
        .collect()
}

/// Convert a Rhai result into a cell value.
pub fn dynamic_to_value(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Empty
    } else if let Ok(n) = value.as_float() {
        Value::Number(n)
    } else if let Ok(n) = value.as_int() {
        Value::Number(n as f64)
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if value.is_string() {
        Value::Text(value.into_string().unwrap_or_default())
    } else if value.is_array() {
        Value::Error(CellError::eval("formula returned an array"))
    } else {
        Value::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::preprocess::prepare_formula;

    #[test]
    fn test_eval_with_bindings_reads_scalars_and_ranges() {
        let engine = create_engine();
        let prepared = prepare_formula("A1 * 2 + SUM(B1:B3)");
        let ast = compile_script(&engine, &prepared.script).unwrap();
        let bindings = vec![
            value_to_dynamic(&Value::Number(4.0)),
            Dynamic::from(values_to_array(&[
                Value::Number(1.0),
                Value::Empty,
                Value::Number(2.0),
            ])),
        ];
        let result = eval_with_bindings(&engine, &ast, bindings).unwrap();
        assert_eq!(dynamic_to_value(result), Value::Number(11.0));
    }

    #[test]
    fn test_empty_cells_read_as_zero() {
        let engine = create_engine();
        let ast = compile_script(&engine, "ref_0 + 1").unwrap();
        let result = eval_with_bindings(&engine, &ast, vec![value_to_dynamic(&Value::Empty)]);
        assert_eq!(dynamic_to_value(result.unwrap()), Value::Number(1.0));
    }

    #[test]
    fn test_compile_error_is_reported() {
        let engine = create_engine();
        let err = compile_script(&engine, "1 +").unwrap_err();
        assert!(err.to_string().starts_with("compile error"));
    }

    #[test]
    fn test_dynamic_to_value_conversions() {
        assert_eq!(dynamic_to_value(Dynamic::UNIT), Value::Empty);
        assert_eq!(dynamic_to_value(Dynamic::from(3_i64)), Value::Number(3.0));
        assert_eq!(dynamic_to_value(Dynamic::from(true)), Value::Bool(true));
        assert_eq!(
            dynamic_to_value(Dynamic::from("hi".to_string())),
            Value::Text("hi".into())
        );
        assert!(matches!(
            dynamic_to_value(Dynamic::from(Array::new())),
            Value::Error(_)
        ));
    }
}
