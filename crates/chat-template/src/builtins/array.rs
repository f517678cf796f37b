/*
 * builtins/array.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Array builtins.
//!
//! `append` and `pop` mutate the shared storage in place. Every other
//! builtin returns a new array and leaves its receiver untouched.

use super::{
    apply_filter, apply_test, attribute, fold_case, length, slice, table, tojson, BuiltinTable,
    FuncArgs, Kind,
};
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use crate::value::{value_cmp, value_eq, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;

pub(super) static ARRAY: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("list", list),
        ("first", first),
        ("last", last),
        ("length", length),
        ("count", length),
        ("slice", slice),
        ("selectattr", selectattr),
        ("rejectattr", rejectattr),
        ("select", select),
        ("reject", reject),
        ("map", map),
        ("join", join),
        ("string", string),
        ("sort", sort),
        ("reverse", reverse),
        ("unique", unique),
        ("append", append),
        ("pop", pop),
        ("sum", sum),
        ("min", min),
        ("max", max),
        ("tojson", tojson),
        ("batch", batch),
    ])
});

fn list(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true)])?;
    Ok(Value::array(args.receiver_array()?.to_vec()))
}

fn first(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true)])?;
    Ok(args.receiver_array()?.get(0).unwrap_or_default())
}

fn last(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true)])?;
    let items = args.receiver_array()?.borrow();
    Ok(items.last().cloned().unwrap_or_default())
}

fn string(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true)])?;
    Ok(Value::string(args.args[0].to_string()))
}

// ============================================================================
// Filtering and mapping
// ============================================================================

/// Shared body of `select`/`reject`: `(test_name?, test_args...)`.
fn select_items(args: &FuncArgs<'_>, keep: bool) -> JinjaResult<Value> {
    args.ensure_count(1, usize::MAX)?;
    let items = args.receiver_array()?.to_vec();
    let test = match args.args.get(1) {
        Some(Value::String(name)) => Some(name.to_string()),
        Some(other) => {
            return Err(JinjaError::type_error(format!(
                "{}: test name must be a string, got {}",
                args.name,
                other.type_name()
            )))
        }
        None => None,
    };
    let extra = args.args.get(2..).unwrap_or(&[]);
    let mut out = Vec::new();
    for item in items {
        let passed = match &test {
            Some(name) => apply_test(args.ctx, name, item.clone(), extra)?,
            None => item.is_truthy(),
        };
        if passed == keep {
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

fn select(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    select_items(args, true)
}

fn reject(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    select_items(args, false)
}

/// Shared body of `selectattr`/`rejectattr`: `(attr, test_name?, test_arg?)`.
/// Without a test, the attribute's truthiness decides.
fn select_by_attribute(args: &FuncArgs<'_>, keep: bool) -> JinjaResult<Value> {
    args.ensure_vals(&[
        (Kind::Array, true),
        (Kind::String, true),
        (Kind::String, false),
        (Kind::Any, false),
    ])?;
    let items = args.receiver_array()?.to_vec();
    let attr = args.args[1].to_string();
    let test = args.args.get(2).map(Value::to_string);
    let extra = args.args.get(3..).unwrap_or(&[]);
    let mut out = Vec::new();
    for item in items {
        let value = attribute(&item, &attr);
        let passed = match &test {
            Some(name) => apply_test(args.ctx, name, value, extra)?,
            None => value.is_truthy(),
        };
        if passed == keep {
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

fn selectattr(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    select_by_attribute(args, true)
}

fn rejectattr(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    select_by_attribute(args, false)
}

/// `map(attribute='x', default=None)` or `map('filter', args...)`.
fn map(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    let items = args.receiver_array()?.to_vec();
    if let Some(attr) = args.kwargs.get("attribute") {
        let attr = attr.to_string();
        let fallback = args.get_kwarg("default");
        return Ok(Value::array(
            items
                .iter()
                .map(|item| match attribute(item, &attr) {
                    Value::Undefined => fallback.clone(),
                    found => found,
                })
                .collect(),
        ));
    }
    let filter = match args.args.get(1) {
        Some(Value::String(name)) => name.to_string(),
        _ => {
            return Err(JinjaError::type_error(
                "map: expected a filter name or attribute=",
            ))
        }
    };
    let extra = args.args.get(2..).unwrap_or(&[]);
    let mapped = items
        .into_iter()
        .map(|item| apply_filter(args.ctx, &filter, item, extra))
        .collect::<JinjaResult<Vec<_>>>()?;
    Ok(Value::array(mapped))
}

/// `join(d='', attribute=None)`. Items keep their provenance.
fn join(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let items = args.receiver_array()?.to_vec();
    let sep = args.opt_str("d", 1)?.unwrap_or_default();
    let attr = args.opt_str("attribute", 2)?.map(|s| s.to_string());
    let mut out = JinjaString::default();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.append(&sep);
        }
        let item = match &attr {
            Some(attr) => attribute(item, attr),
            None => item.clone(),
        };
        out.append(&item.to_display());
    }
    if out.parts().is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::String(out))
}

// ============================================================================
// Ordering
// ============================================================================

/// Comparison key for an item under `attribute` and `case_sensitive`.
fn sort_key(item: &Value, attr: Option<&str>, case_sensitive: bool) -> Value {
    let value = match attr {
        Some(attr) => attribute(item, attr),
        None => item.clone(),
    };
    fold_case(value, case_sensitive)
}

/// Sort `items` by key, surfacing the first comparison error.
fn sort_values(
    items: Vec<Value>,
    attr: Option<&str>,
    case_sensitive: bool,
) -> JinjaResult<Vec<Value>> {
    let mut keyed: Vec<(Value, Value)> = items
        .into_iter()
        .map(|item| (sort_key(&item, attr, case_sensitive), item))
        .collect();
    let mut error = None;
    keyed.sort_by(|a, b| match value_cmp(&a.0, &b.0) {
        Ok(ordering) => ordering,
        Err(e) => {
            error.get_or_insert(e);
            Ordering::Equal
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(keyed.into_iter().map(|(_, item)| item).collect()),
    }
}

/// `sort(reverse=False, case_sensitive=False, attribute=None)`
fn sort(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 4)?;
    let items = args.receiver_array()?.to_vec();
    let reverse = args.flag("reverse", 1);
    let case_sensitive = args.flag("case_sensitive", 2);
    let attr = args.opt_str("attribute", 3)?.map(|s| s.to_string());
    let mut sorted = sort_values(items, attr.as_deref(), case_sensitive)?;
    if reverse {
        sorted.reverse();
    }
    Ok(Value::array(sorted))
}

fn reverse(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true)])?;
    let mut items = args.receiver_array()?.to_vec();
    items.reverse();
    Ok(Value::array(items))
}

/// `unique(case_sensitive=False, attribute=None)`: first occurrences, in
/// order.
fn unique(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let case_sensitive = args.flag("case_sensitive", 1);
    let attr = args.opt_str("attribute", 2)?.map(|s| s.to_string());
    let mut seen: Vec<Value> = Vec::new();
    let mut out = Vec::new();
    for item in args.receiver_array()?.to_vec() {
        let key = sort_key(&item, attr.as_deref(), case_sensitive);
        if !seen.iter().any(|s| value_eq(s, &key)) {
            seen.push(key);
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

fn extreme(args: &FuncArgs<'_>, want: Ordering) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let case_sensitive = args.flag("case_sensitive", 1);
    let attr = args.opt_str("attribute", 2)?.map(|s| s.to_string());
    let mut best: Option<(Value, Value)> = None;
    for item in args.receiver_array()?.to_vec() {
        let key = sort_key(&item, attr.as_deref(), case_sensitive);
        let replace = match &best {
            None => true,
            Some((best_key, _)) => value_cmp(&key, best_key)? == want,
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map(|(_, item)| item).unwrap_or_default())
}

/// `min(case_sensitive=False, attribute=None)`. Empty arrays give Undefined.
fn min(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    extreme(args, Ordering::Less)
}

fn max(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    extreme(args, Ordering::Greater)
}

/// `sum(attribute=None, start=0)`
fn sum(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let attr = args.opt_str("attribute", 1)?.map(|s| s.to_string());
    let mut total = match args.get_kwarg_or_pos("start", 2) {
        Value::Undefined => Value::Int(0),
        other => other,
    };
    for item in args.receiver_array()?.to_vec() {
        let item = match &attr {
            Some(attr) => attribute(&item, attr),
            None => item,
        };
        total = match (&total, &item) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Value::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
            }
            (a, b) => {
                return Err(JinjaError::type_error(format!(
                    "sum: unsupported operand types {} and {}",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
    }
    Ok(total)
}

// ============================================================================
// Mutation
// ============================================================================

fn append(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true), (Kind::Any, true)])?;
    args.receiver_array()?.push(args.args[1].clone());
    Ok(Value::None)
}

/// `pop(index=-1)`
fn pop(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Array, true), (Kind::Int, false)])?;
    let array = args.receiver_array()?;
    let index = args.opt_int("index", 1)?.unwrap_or(-1);
    let len = array.len() as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(JinjaError::type_error(format!(
            "pop: index {} out of range for array of length {}",
            index, len
        )));
    }
    Ok(array.borrow_mut().remove(resolved as usize))
}

fn batch(_: &FuncArgs<'_>) -> JinjaResult<Value> {
    Err(JinjaError::not_implemented(
        "array builtin 'batch' is not implemented",
    ))
}
