/*
 * builtins/number.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Builtins on ints, floats and bools.

use super::{table, to_string, tojson, BuiltinTable, FuncArgs, Kind};
use crate::error::{JinjaError, JinjaResult};
use crate::value::Value;
use once_cell::sync::Lazy;

pub(super) static NUMBER: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("abs", abs),
        ("int", to_int),
        ("float", to_float),
        ("round", round),
        ("string", to_string),
        ("tojson", tojson),
    ])
});

pub(super) static BOOL: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("int", to_int),
        ("float", to_float),
        ("string", to_string),
        ("tojson", tojson),
    ])
});

fn abs(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Number, true)])?;
    Ok(match &args.args[0] {
        Value::Int(i) => Value::Int(i.wrapping_abs()),
        other => Value::Float(other.as_f64().unwrap_or(0.0).abs()),
    })
}

/// Parse a string as an integer in `base`, accepting a float spelling when
/// the base is 10.
pub(super) fn parse_int(text: &str, base: u32) -> Option<i64> {
    let text = text.trim();
    let digits = match base {
        16 => text.trim_start_matches("0x").trim_start_matches("0X"),
        8 => text.trim_start_matches("0o").trim_start_matches("0O"),
        2 => text.trim_start_matches("0b").trim_start_matches("0B"),
        _ => text,
    };
    let digits = digits.replace('_', "");
    i64::from_str_radix(&digits, base).ok().or_else(|| {
        if base == 10 {
            digits.parse::<f64>().ok().map(|f| f as i64)
        } else {
            None
        }
    })
}

/// `int(default=0, base=10)`
pub(super) fn to_int(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let fallback = match args.get_kwarg_or_pos("default", 1) {
        Value::Undefined => Value::Int(0),
        other => other,
    };
    let base = args.opt_int("base", 2)?.unwrap_or(10);
    if !(2..=36).contains(&base) {
        return Err(JinjaError::type_error(format!("int: invalid base {}", base)));
    }
    Ok(match &args.args[0] {
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => Value::Int(f.trunc() as i64),
        Value::Bool(b) => Value::Int(*b as i64),
        Value::String(s) => parse_int(&s.as_str(), base as u32)
            .map(Value::Int)
            .unwrap_or(fallback),
        _ => fallback,
    })
}

/// `float(default=0.0)`
pub(super) fn to_float(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 2)?;
    let fallback = match args.get_kwarg_or_pos("default", 1) {
        Value::Undefined => Value::Float(0.0),
        other => other,
    };
    Ok(match &args.args[0] {
        Value::Int(i) => Value::Float(*i as f64),
        Value::Float(f) => Value::Float(*f),
        Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .as_str()
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(fallback),
        _ => fallback,
    })
}

/// `round(precision=0, method='common')`. Always returns a float.
fn round(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Number, true), (Kind::Int, false), (Kind::String, false)])?;
    let value = args.args[0].as_f64().unwrap_or(0.0);
    let precision = args.opt_int("precision", 1)?.unwrap_or(0);
    let method = args
        .opt_str("method", 2)?
        .map(|s| s.to_string())
        .unwrap_or_else(|| "common".to_string());
    let scale = 10f64.powi(precision.clamp(-308, 308) as i32);
    let scaled = value * scale;
    let rounded = match method.as_str() {
        "common" => scaled.round_ties_even(),
        "floor" => scaled.floor(),
        "ceil" => scaled.ceil(),
        other => {
            return Err(JinjaError::type_error(format!(
                "round: method must be 'common', 'ceil' or 'floor', got '{}'",
                other
            )))
        }
    };
    Ok(Value::Float(rounded / scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::apply_filter;
    use crate::context::Context;
    use pretty_assertions::assert_eq;

    fn filter(name: &str, value: Value, extra: Vec<Value>) -> Value {
        apply_filter(&Context::new(), name, value, &extra).unwrap()
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(filter("int", Value::Float(3.9), vec![]), Value::Int(3));
        assert_eq!(filter("int", Value::Float(-3.9), vec![]), Value::Int(-3));
        assert_eq!(filter("int", Value::string(" 42 "), vec![]), Value::Int(42));
        assert_eq!(filter("int", Value::string("4.7"), vec![]), Value::Int(4));
        assert_eq!(filter("int", Value::string("abc"), vec![]), Value::Int(0));
        assert_eq!(filter("int", Value::string("abc"), vec![Value::Int(-1)]), Value::Int(-1));
        assert_eq!(
            filter("int", Value::string("ff"), vec![Value::Int(0), Value::Int(16)]),
            Value::Int(255)
        );
        assert_eq!(filter("int", Value::Bool(true), vec![]), Value::Int(1));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(filter("float", Value::Int(2), vec![]).to_string(), "2.0");
        assert_eq!(filter("float", Value::string("1.5"), vec![]), Value::Float(1.5));
        assert_eq!(filter("float", Value::string("x"), vec![]), Value::Float(0.0));
    }

    #[test]
    fn test_round() {
        assert_eq!(filter("round", Value::Float(2.5), vec![]).to_string(), "2.0");
        assert_eq!(filter("round", Value::Float(3.5), vec![]).to_string(), "4.0");
        assert_eq!(filter("round", Value::Float(1.2345), vec![Value::Int(2)]).to_string(), "1.23");
        assert_eq!(
            filter("round", Value::Float(1.21), vec![Value::Int(1), Value::string("ceil")]).to_string(),
            "1.3"
        );
        assert_eq!(filter("round", Value::Int(7), vec![]).to_string(), "7.0");
    }

    #[test]
    fn test_abs_and_string() {
        assert_eq!(filter("abs", Value::Int(-4), vec![]), Value::Int(4));
        assert_eq!(filter("abs", Value::Float(-0.5), vec![]), Value::Float(0.5));
        assert_eq!(filter("string", Value::Float(1.0), vec![]), Value::string("1.0"));
        assert_eq!(filter("string", Value::Bool(false), vec![]), Value::string("False"));
    }
}
