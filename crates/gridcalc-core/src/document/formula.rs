//! Rhai-backed formula compilation and execution.
//!
//! A formula is compiled once against the workbook's sheet names and bounds:
//! every reference resolves to a [`BoundingBox`] (its declared dependency) and
//! to a binding slot the executor fills in before running the Rhai program.

use gridcalc_engine::engine::{
    AST, CellError, Dynamic, Engine, RangeRef, RefKind, Value, compile_script, create_engine,
    dynamic_to_value, eval_with_bindings, prepare_formula, value_to_dynamic, values_to_array,
};

use crate::config::RecalcConfig;
use crate::graph::{BoundingBox, CellPosition, SheetId, Zone};
use crate::scheduler::{CellReader, Formula, FormulaExecutor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Binding {
    /// `None` when the reference names an unknown sheet or leaves the sheet bounds.
    target: Option<BoundingBox>,
    /// Bound as a scalar rather than an array.
    single: bool,
}

#[derive(Debug)]
pub struct CompiledFormula {
    /// Formula text without the leading `=`.
    pub source: String,
    dependencies: Vec<BoundingBox>,
    bindings: Vec<Binding>,
    program: Result<AST, CellError>,
    has_invalid_reference: bool,
}

impl Formula for CompiledFormula {
    fn dependencies(&self) -> &[BoundingBox] {
        &self.dependencies
    }
}

impl CompiledFormula {
    /// Compile `source` for a cell on `sheet`. Unqualified references point at
    /// `sheet`; qualified ones are resolved with `sheet_id`.
    pub fn compile(
        source: &str,
        sheet: SheetId,
        sheet_id: impl Fn(&str) -> Option<SheetId>,
        engine: &Engine,
        config: &RecalcConfig,
    ) -> CompiledFormula {
        let prepared = prepare_formula(source);
        let mut dependencies = Vec::with_capacity(prepared.references.len());
        let mut bindings = Vec::with_capacity(prepared.references.len());
        for reference in &prepared.references {
            let target = resolve(reference, sheet, &sheet_id, config);
            if let Some(bbox) = target {
                dependencies.push(bbox);
            }
            bindings.push(Binding {
                target,
                single: reference.is_single(),
            });
        }
        let program = compile_script(engine, &prepared.script).map_err(CellError::from);
        CompiledFormula {
            source: source.to_string(),
            dependencies,
            bindings,
            program,
            has_invalid_reference: prepared.has_invalid_reference,
        }
    }
}

fn resolve(
    reference: &RangeRef,
    sheet: SheetId,
    sheet_id: &impl Fn(&str) -> Option<SheetId>,
    config: &RecalcConfig,
) -> Option<BoundingBox> {
    let sheet = match &reference.sheet {
        Some(name) => sheet_id(name)?,
        None => sheet,
    };
    let in_cols = |col: usize| u32::try_from(col).ok().filter(|c| *c <= config.last_col());
    let in_rows = |row: usize| u32::try_from(row).ok().filter(|r| *r <= config.last_row());

    let left = in_cols(reference.start.col)?;
    let right = in_cols(reference.end.col)?;
    let (top, bottom) = match reference.kind {
        RefKind::Columns => (0, config.last_row()),
        RefKind::Cell | RefKind::Range => (in_rows(reference.start.row)?, in_rows(reference.end.row)?),
    };
    Some(BoundingBox::new(sheet, Zone::new(top, left, bottom, right)))
}

/// Runs [`CompiledFormula`]s on a Rhai engine owned by one workbook.
pub struct RhaiExecutor {
    engine: Engine,
}

impl RhaiExecutor {
    pub fn new() -> RhaiExecutor {
        RhaiExecutor {
            engine: create_engine(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Default for RhaiExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RhaiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiExecutor").finish_non_exhaustive()
    }
}

impl FormulaExecutor for RhaiExecutor {
    type Formula = CompiledFormula;

    fn execute(
        &self,
        _position: Option<CellPosition>,
        formula: &CompiledFormula,
        reader: &mut dyn CellReader,
    ) -> Result<Value, CellError> {
        if formula.has_invalid_reference {
            return Err(CellError::invalid_reference());
        }
        let program = formula.program.as_ref().map_err(Clone::clone)?;

        let mut values = Vec::with_capacity(formula.bindings.len());
        for binding in &formula.bindings {
            let target = binding.target.ok_or_else(CellError::invalid_reference)?;
            let value = if binding.single {
                value_to_dynamic(&reader.read_cell(target.top_left())?)
            } else {
                Dynamic::from(values_to_array(&reader.read_range(&target)?))
            };
            values.push(value);
        }

        eval_with_bindings(&self.engine, program, values)
            .map(dynamic_to_value)
            .map_err(|e| CellError::eval(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_engine::engine::ErrorKind;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompiledFormula {
        let lookup = |name: &str| (name == "Data").then_some(1);
        CompiledFormula::compile(source, 0, lookup, &create_engine(), &RecalcConfig::default())
    }

    /// Reader over a fixed set of values.
    struct Fixed(Vec<(CellPosition, Value)>);

    impl CellReader for Fixed {
        fn read_cell(&mut self, position: CellPosition) -> Result<Value, CellError> {
            let found = self.0.iter().find(|(p, _)| *p == position);
            match found.map(|(_, v)| v.clone()) {
                Some(Value::Error(e)) => Err(e),
                Some(v) => Ok(v),
                None => Ok(Value::Empty),
            }
        }

        fn read_range(&mut self, bbox: &BoundingBox) -> Result<Vec<Value>, CellError> {
            Ok(bbox
                .positions()
                .filter_map(|p| self.0.iter().find(|(q, _)| *q == p).map(|(_, v)| v.clone()))
                .collect())
        }
    }

    #[test]
    fn test_compile_resolves_dependencies() {
        let formula = compile("A1 + SUM(Data!B1:B3) + SUM(C:C)");
        assert_eq!(
            formula.dependencies(),
            &[
                BoundingBox::new(0, Zone::cell(0, 0)),
                BoundingBox::new(1, Zone::new(0, 1, 2, 1)),
                BoundingBox::new(0, Zone::new(0, 2, 1_048_575, 2)),
            ]
        );
        assert!(formula.bindings.iter().all(|b| b.target.is_some()));
    }

    #[test]
    fn test_unknown_sheet_is_invalid_reference() {
        let formula = compile("Missing!A1 + 1");
        assert!(formula.dependencies().is_empty());
        let result = RhaiExecutor::new().execute(None, &formula, &mut Fixed(vec![]));
        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidReference);
    }

    #[test]
    fn test_execute_binds_values() {
        let formula = compile("A1 * 2 + SUM(B1:B2)");
        let mut reader = Fixed(vec![
            (CellPosition::new(0, 0, 0), Value::Number(3.0)),
            (CellPosition::new(0, 1, 0), Value::Number(1.0)),
            (CellPosition::new(0, 1, 1), Value::Number(2.0)),
        ]);
        let result = RhaiExecutor::new().execute(None, &formula, &mut reader);
        assert_eq!(result, Ok(Value::Number(9.0)));
    }

    #[test]
    fn test_execute_propagates_read_errors() {
        let formula = compile("A1 + 1");
        let mut reader = Fixed(vec![(CellPosition::new(0, 0, 0), Value::Error(CellError::circular()))]);
        let result = RhaiExecutor::new().execute(None, &formula, &mut reader);
        assert_eq!(result.unwrap_err().kind, ErrorKind::CircularDependency);
    }

    #[test]
    fn test_syntax_error_is_eval_error() {
        let formula = compile("1 +");
        let result = RhaiExecutor::new().execute(None, &formula, &mut Fixed(vec![]));
        assert_eq!(result.unwrap_err().kind, ErrorKind::Eval);
    }
}
