//! Built-in spreadsheet functions (Rust) registered into the Rhai engine.
//!
//! Conventions:
//! - Spreadsheet-facing built-in names are ALL CAPS (e.g. `SUM`, `AVG`).
//! - Range references reach Rhai as arrays of the range's non-empty values,
//!   single-cell references as plain scalars, so every range function has an
//!   `Array` overload and a scalar overload.

use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position};

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(n) = value.as_float() {
        return Some(n);
    }
    if let Ok(n) = value.as_int() {
        return Some(n as f64);
    }
    None
}

fn numbers(values: &Array) -> impl Iterator<Item = f64> + '_ {
    values.iter().filter_map(as_number)
}

fn to_decimal_places(value: i64) -> Result<usize, Box<EvalAltResult>> {
    const MAX_DECIMALS: usize = 12;
    let places =
        usize::try_from(value).map_err(|_| invalid_arg("decimals must be >= 0"))?;
    if places > MAX_DECIMALS {
        return Err(invalid_arg(&format!(
            "decimals must be <= {}",
            MAX_DECIMALS
        )));
    }
    Ok(places)
}

fn round_to(n: f64, decimals: i64) -> f64 {
    let factor = 10f64.powi(decimals.clamp(-15, 15) as i32);
    (n * factor).round() / factor
}

/// Register all built-in functions into the Rhai engine.
pub fn register_builtins(engine: &mut Engine) {
    // SUM(range): sum of numeric values
    engine.register_fn("SUM", |values: Array| -> f64 { numbers(&values).sum() });
    engine.register_fn("SUM", |n: f64| -> f64 { n });
    engine.register_fn("SUM", |n: i64| -> f64 { n as f64 });

    // AVG(range): average of numeric values
    engine.register_fn(
        "AVG",
        |values: Array| -> Result<f64, Box<EvalAltResult>> {
            let (sum, count) = numbers(&values).fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
            if count == 0 {
                return Err(invalid_arg("AVG of a range without numbers"));
            }
            Ok(sum / count as f64)
        },
    );
    engine.register_fn("AVG", |n: f64| -> f64 { n });
    engine.register_fn("AVG", |n: i64| -> f64 { n as f64 });

    // COUNT(range): count of non-empty cells
    engine.register_fn("COUNT", |values: Array| -> f64 { values.len() as f64 });
    engine.register_fn("COUNT", |_value: Dynamic| -> f64 { 1.0 });

    // MIN(range) / MAX(range): extremes of numeric values, 0 when there are none
    engine.register_fn("MIN", |values: Array| -> f64 {
        numbers(&values).reduce(f64::min).unwrap_or(0.0)
    });
    engine.register_fn("MIN", |n: f64| -> f64 { n });
    engine.register_fn("MIN", |a: f64, b: f64| -> f64 { a.min(b) });
    engine.register_fn("MAX", |values: Array| -> f64 {
        numbers(&values).reduce(f64::max).unwrap_or(0.0)
    });
    engine.register_fn("MAX", |n: f64| -> f64 { n });
    engine.register_fn("MAX", |a: f64, b: f64| -> f64 { a.max(b) });

    // SUMIF(range, predicate): sum numeric values where predicate returns true
    engine.register_fn(
        "SUMIF",
        |ctx: NativeCallContext, values: Array, pred: FnPtr| -> Result<f64, Box<EvalAltResult>> {
            let mut sum = 0.0;
            for n in numbers(&values) {
                if pred.call_within_context::<bool>(&ctx, (n,))? {
                    sum += n;
                }
            }
            Ok(sum)
        },
    );

    // COUNTIF(range, predicate): count cells where predicate returns true
    engine.register_fn(
        "COUNTIF",
        |ctx: NativeCallContext, values: Array, pred: FnPtr| -> Result<f64, Box<EvalAltResult>> {
            let mut count = 0.0;
            for value in values {
                if pred.call_within_context::<bool>(&ctx, (value,))? {
                    count += 1.0;
                }
            }
            Ok(count)
        },
    );

    // IF(cond, then, else): pick one of two already-evaluated values
    engine.register_fn("IF", |cond: bool, then: Dynamic, otherwise: Dynamic| -> Dynamic {
        if cond { then } else { otherwise }
    });

    engine.register_fn("ABS", |x: f64| -> f64 { x.abs() });
    engine.register_fn("ABS", |x: i64| -> f64 { (x as f64).abs() });

    // ROUND(x, decimals): round half away from zero
    engine.register_fn("ROUND", |x: f64, decimals: i64| -> f64 { round_to(x, decimals) });
    engine.register_fn("ROUND", |x: i64, _decimals: i64| -> f64 { x as f64 });

    // POW(base, exp): exponentiation
    // Handle all type combinations since cell values can be int or float
    engine.register_fn("POW", |base: f64, exp: f64| -> f64 { base.powf(exp) });
    engine.register_fn("POW", |base: f64, exp: i64| -> f64 {
        base.powf(exp as f64)
    });
    engine.register_fn("POW", |base: i64, exp: f64| -> f64 {
        (base as f64).powf(exp)
    });
    engine.register_fn("POW", |base: i64, exp: i64| -> f64 {
        (base as f64).powf(exp as f64)
    });

    // SQRT(x): square root
    engine.register_fn("SQRT", |x: f64| -> f64 { x.sqrt() });
    engine.register_fn("SQRT", |x: i64| -> f64 { (x as f64).sqrt() });

    // FIXED(n, decimals): format with a fixed number of decimal places.
    engine.register_fn(
        "FIXED",
        |n: f64, decimals: i64| -> Result<String, Box<EvalAltResult>> {
            let decimals = to_decimal_places(decimals)?;
            Ok(format!("{:.*}", decimals, n))
        },
    );
    engine.register_fn(
        "FIXED",
        |n: i64, decimals: i64| -> Result<String, Box<EvalAltResult>> {
            let decimals = to_decimal_places(decimals)?;
            Ok(format!("{:.*}", decimals, n as f64))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register_builtins(&mut engine);
        engine
    }

    fn range(values: &[f64]) -> Array {
        values.iter().map(|v| Dynamic::from(*v)).collect()
    }

    #[test]
    fn test_sum_over_array_skips_text() {
        let engine = engine();
        let mut scope = rhai::Scope::new();
        let mut values = range(&[1.0, 2.0, 3.0]);
        values.push(Dynamic::from("x".to_string()));
        scope.push("r", values);
        let result: f64 = engine.eval_with_scope(&mut scope, "SUM(r)").unwrap();
        assert_eq!(result, 6.0);
    }

    #[test]
    fn test_avg_of_empty_range_is_an_error() {
        let engine = engine();
        let mut scope = rhai::Scope::new();
        scope.push("r", Array::new());
        assert!(engine.eval_with_scope::<f64>(&mut scope, "AVG(r)").is_err());
    }

    #[test]
    fn test_min_max_default_to_zero() {
        let engine = engine();
        let mut scope = rhai::Scope::new();
        scope.push("r", Array::new());
        let min: f64 = engine.eval_with_scope(&mut scope, "MIN(r)").unwrap();
        let max: f64 = engine.eval_with_scope(&mut scope, "MAX(r)").unwrap();
        assert_eq!((min, max), (0.0, 0.0));
    }

    #[test]
    fn test_sumif_applies_predicate() {
        let engine = engine();
        let mut scope = rhai::Scope::new();
        scope.push("r", range(&[1.0, 5.0, 10.0]));
        let result: f64 = engine
            .eval_with_scope(&mut scope, "SUMIF(r, |x| x > 2.0)")
            .unwrap();
        assert_eq!(result, 15.0);
    }

    #[test]
    fn test_if_selects_branch() {
        let engine = engine();
        let picked: f64 = engine.eval("IF(2.0 > 1.0, 10.0, 20.0)").unwrap();
        assert_eq!(picked, 10.0);
    }

    #[test]
    fn test_round_and_fixed() {
        let engine = engine();
        let rounded: f64 = engine.eval("ROUND(2.346, 2)").unwrap();
        assert!((rounded - 2.35).abs() < 1e-9);
        let fixed: String = engine.eval("FIXED(3.14159, 2)").unwrap();
        assert_eq!(fixed, "3.14");
        assert!(engine.eval::<String>("FIXED(1.0, 20)").is_err());
    }
}
