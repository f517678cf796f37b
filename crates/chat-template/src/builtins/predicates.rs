/*
 * builtins/predicates.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tests for `x is name(args)`, `select('name')` and `selectattr`.

use super::{table, BuiltinTable, FuncArgs};
use crate::error::{JinjaError, JinjaResult};
use crate::value::{value_cmp, value_eq, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;

pub(super) static TESTS: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("boolean", is_boolean),
        ("callable", is_callable),
        ("odd", is_odd),
        ("even", is_even),
        ("false", is_false),
        ("true", is_true),
        ("string", is_string),
        ("integer", is_integer),
        ("float", is_float),
        ("number", is_number),
        ("iterable", is_iterable),
        ("sequence", is_iterable),
        ("mapping", is_mapping),
        ("lower", is_lower),
        ("upper", is_upper),
        ("none", is_none),
        ("defined", is_defined),
        ("undefined", is_undefined),
        ("equalto", equal),
        ("eq", equal),
        ("==", equal),
        ("ne", not_equal),
        ("!=", not_equal),
        ("gt", greater),
        (">", greater),
        ("ge", greater_or_equal),
        (">=", greater_or_equal),
        ("lt", less),
        ("<", less),
        ("le", less_or_equal),
        ("<=", less_or_equal),
        ("in", contained_in),
        ("divisibleby", divisible_by),
    ])
});

fn subject<'v>(args: &'v FuncArgs<'_>) -> JinjaResult<&'v Value> {
    args.args.first().ok_or_else(|| {
        JinjaError::type_error(format!("test '{}' needs a value to test", args.name))
    })
}

fn check(args: &FuncArgs<'_>, f: impl FnOnce(&Value) -> bool) -> JinjaResult<Value> {
    args.ensure_count(1, 1)?;
    Ok(Value::Bool(f(subject(args)?)))
}

fn is_boolean(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Bool(_)))
}

fn is_callable(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Function(_)))
}

fn is_false(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Bool(false)))
}

fn is_true(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Bool(true)))
}

fn is_string(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::String(_)))
}

fn is_integer(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Int(_)))
}

fn is_float(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Float(_)))
}

fn is_number(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, Value::is_numeric)
}

fn is_iterable(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Array(_) | Value::String(_)))
}

fn is_mapping(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| matches!(v, Value::Object(_)))
}

fn is_none(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, Value::is_none)
}

fn is_defined(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, |v| !v.is_undefined())
}

fn is_undefined(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    check(args, Value::is_undefined)
}

/// True for strings with at least one cased character and all cased
/// characters in the wanted case.
fn cased(args: &FuncArgs<'_>, upper: bool) -> JinjaResult<Value> {
    check(args, |v| match v {
        Value::String(s) => {
            let text = s.as_str();
            let mut any = false;
            for c in text.chars() {
                if c.is_lowercase() || c.is_uppercase() {
                    any = true;
                    if c.is_uppercase() != upper {
                        return false;
                    }
                }
            }
            any
        }
        _ => false,
    })
}

fn is_lower(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    cased(args, false)
}

fn is_upper(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    cased(args, true)
}

fn integer(args: &FuncArgs<'_>) -> JinjaResult<i64> {
    match subject(args)? {
        Value::Int(i) => Ok(*i),
        other => Err(JinjaError::type_error(format!(
            "test '{}' expects an int, got {}",
            args.name,
            other.type_name()
        ))),
    }
}

fn is_odd(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 1)?;
    Ok(Value::Bool(integer(args)? % 2 != 0))
}

fn is_even(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 1)?;
    Ok(Value::Bool(integer(args)? % 2 == 0))
}

fn divisible_by(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(2, 2)?;
    let n = integer(args)?;
    match args.args[1] {
        Value::Int(0) => Err(JinjaError::type_error("divisibleby: division by zero")),
        Value::Int(d) => Ok(Value::Bool(n % d == 0)),
        ref other => Err(JinjaError::type_error(format!(
            "divisibleby: expected int, got {}",
            other.type_name()
        ))),
    }
}

fn compare(args: &FuncArgs<'_>, accept: fn(Ordering) -> bool) -> JinjaResult<Value> {
    args.ensure_count(2, 2)?;
    Ok(Value::Bool(accept(value_cmp(&args.args[0], &args.args[1])?)))
}

fn equal(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(2, 2)?;
    Ok(Value::Bool(value_eq(&args.args[0], &args.args[1])))
}

fn not_equal(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(2, 2)?;
    Ok(Value::Bool(!value_eq(&args.args[0], &args.args[1])))
}

fn greater(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    compare(args, Ordering::is_gt)
}

fn greater_or_equal(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    compare(args, Ordering::is_ge)
}

fn less(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    compare(args, Ordering::is_lt)
}

fn less_or_equal(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    compare(args, Ordering::is_le)
}

/// `x is in(seq)`
fn contained_in(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(2, 2)?;
    Ok(Value::Bool(contains(&args.args[1], &args.args[0])?))
}

/// Membership as used by `in`, `not in` and the `in` test.
/// Undefined contains nothing.
pub(crate) fn contains(container: &Value, item: &Value) -> JinjaResult<bool> {
    match container {
        Value::Array(a) => Ok(a.borrow().iter().any(|v| value_eq(v, item))),
        Value::Object(o) => Ok(match item {
            Value::String(key) => o.contains_key(&key.as_str()),
            _ => false,
        }),
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.as_str().contains(&*needle.as_str())),
            other => Err(JinjaError::type_error(format!(
                "'in <string>' requires a string on the left, got {}",
                other.type_name()
            ))),
        },
        Value::Undefined => Ok(false),
        other => Err(JinjaError::type_error(format!(
            "argument of type {} is not iterable",
            other.type_name()
        ))),
    }
}
