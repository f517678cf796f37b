/*
 * builtins/object.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Object builtins.
//!
//! Objects have no `default` member, so `obj.default` reads the key or
//! yields Undefined. The `default` filter still applies to objects through
//! the common filters.

use super::{fold_case, length, table, to_string, tojson, BuiltinTable, FuncArgs, Kind};
use crate::error::{JinjaError, JinjaResult};
use crate::value::{value_cmp, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;

pub(super) static OBJECT: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("get", get),
        ("keys", keys),
        ("values", values),
        ("items", items),
        ("length", length),
        ("dictsort", dictsort),
        ("update", update),
        ("pop", pop),
        ("tojson", tojson),
        ("string", to_string),
    ])
});

fn pair(key: String, value: Value) -> Value {
    Value::array(vec![Value::string(key), value])
}

/// `get(key, default=None)`
fn get(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true), (Kind::Any, true), (Kind::Any, false)])?;
    let key = args.args[1].to_string();
    let fallback = match args.get_kwarg_or_pos("default", 2) {
        Value::Undefined => Value::None,
        other => other,
    };
    Ok(args.receiver_object()?.get(&key).unwrap_or(fallback))
}

fn keys(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true)])?;
    Ok(Value::array(
        args.receiver_object()?
            .keys()
            .into_iter()
            .map(Value::string)
            .collect(),
    ))
}

fn values(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true)])?;
    Ok(Value::array(
        args.receiver_object()?
            .entries()
            .into_iter()
            .map(|(_, v)| v)
            .collect(),
    ))
}

/// `(key, value)` pairs as two-element arrays.
fn items(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true)])?;
    Ok(Value::array(
        args.receiver_object()?
            .entries()
            .into_iter()
            .map(|(k, v)| pair(k, v))
            .collect(),
    ))
}

/// `dictsort(case_sensitive=False, by='key', reverse=False)`: sorted
/// `(key, value)` pairs.
fn dictsort(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 4)?;
    let case_sensitive = args.flag("case_sensitive", 1);
    let by_value = match args.opt_str("by", 2)? {
        None => false,
        Some(by) if by.as_str() == "key" => false,
        Some(by) if by.as_str() == "value" => true,
        Some(by) => {
            return Err(JinjaError::type_error(format!(
                "dictsort: 'by' must be 'key' or 'value', got '{}'",
                by
            )))
        }
    };
    let reverse = args.flag("reverse", 3);

    let mut entries = args.receiver_object()?.entries();
    let mut error = None;
    entries.sort_by(|a, b| {
        let (ka, kb) = if by_value {
            (a.1.clone(), b.1.clone())
        } else {
            (Value::string(a.0.as_str()), Value::string(b.0.as_str()))
        };
        match value_cmp(&fold_case(ka, case_sensitive), &fold_case(kb, case_sensitive)) {
            Ok(ordering) => ordering,
            Err(e) => {
                error.get_or_insert(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    if reverse {
        entries.reverse();
    }
    Ok(Value::array(
        entries.into_iter().map(|(k, v)| pair(k, v)).collect(),
    ))
}

/// Merge another object (and/or keyword arguments) into this one in place.
fn update(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true), (Kind::Object, false)])?;
    let target = args.receiver_object()?;
    if let Some(Value::Object(source)) = args.args.get(1) {
        for (key, value) in source.entries() {
            target.insert(key, value);
        }
    }
    for (key, value) in &args.kwargs {
        target.insert(key.clone(), value.clone());
    }
    Ok(Value::None)
}

/// `pop(key[, default])` removes the key, keeping the order of the rest.
fn pop(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, true), (Kind::Any, true), (Kind::Any, false)])?;
    let key = args.args[1].to_string();
    let removed = args.receiver_object()?.borrow_mut().shift_remove(&key);
    match (removed, args.args.get(2)) {
        (Some(value), _) => Ok(value),
        (None, Some(fallback)) => Ok(fallback.clone()),
        (None, None) => Err(JinjaError::type_error(format!(
            "pop: key '{}' not found",
            key
        ))),
    }
}
