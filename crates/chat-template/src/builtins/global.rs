/*
 * builtins/global.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Functions bound to bare identifiers.

use super::{table, tojson, BuiltinTable, FuncArgs, Kind};
use crate::error::{JinjaError, JinjaResult};
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::fmt::Write;

pub(super) static GLOBAL: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("raise_exception", raise_exception),
        ("namespace", namespace),
        ("dict", namespace),
        ("range", range),
        ("strftime_now", strftime_now),
        ("tojson", tojson),
    ])
});

/// Abort the render with the template's own message.
fn raise_exception(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    Err(JinjaError::raised(args.args[0].to_string()))
}

/// A fresh object from keyword arguments, optionally seeded from a
/// positional object.
fn namespace(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Object, false)])?;
    let mut entries = IndexMap::new();
    if let Some(Value::Object(seed)) = args.args.first() {
        for (key, value) in seed.entries() {
            entries.insert(key, value);
        }
    }
    for (key, value) in &args.kwargs {
        entries.insert(key.clone(), value.clone());
    }
    Ok(Value::object(entries))
}

/// `range(stop)` or `range(start, stop[, step])`.
fn range(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::Int, true), (Kind::Int, false), (Kind::Int, false)])?;
    let ints: Vec<i64> = args.args.iter().filter_map(Value::as_i64).collect();
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(JinjaError::type_error("range: expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(JinjaError::type_error("range() step argument must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::array(out))
}

/// Format the render's clock with a strftime pattern.
fn strftime_now(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    let pattern = args.args[0].to_string();
    let mut out = String::new();
    write!(out, "{}", args.ctx.now().format(&pattern)).map_err(|_| {
        JinjaError::type_error(format!("strftime_now: invalid format '{}'", pattern))
    })?;
    Ok(Value::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::ErrorKind;
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>, ctx: &Context) -> JinjaResult<Value> {
        let func = GLOBAL[name];
        func(&FuncArgs::new(name, args, ctx))
    }

    #[test]
    fn test_raise_exception_keeps_message() {
        let ctx = Context::new();
        let err = call("raise_exception", vec![Value::string("no system role")], &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Raised);
        assert_eq!(err.raised_message(), Some("no system role"));
    }

    #[test]
    fn test_range() {
        let ctx = Context::new();
        let r = |args: Vec<i64>| {
            call("range", args.into_iter().map(Value::Int).collect(), &ctx)
                .unwrap()
                .to_string()
        };
        assert_eq!(r(vec![3]), "[0, 1, 2]");
        assert_eq!(r(vec![2, 5]), "[2, 3, 4]");
        assert_eq!(r(vec![5, 0, -2]), "[5, 3, 1]");
        assert_eq!(r(vec![0]), "[]");
        assert!(call("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)], &ctx).is_err());
    }

    #[test]
    fn test_range_stops_at_integer_bounds() {
        let ctx = Context::new();
        let r = |args: Vec<i64>| {
            call("range", args.into_iter().map(Value::Int).collect(), &ctx)
                .unwrap()
                .to_string()
        };
        assert_eq!(r(vec![i64::MAX - 1, i64::MAX, 5]), format!("[{}]", i64::MAX - 1));
        assert_eq!(r(vec![i64::MIN + 1, i64::MIN, -5]), format!("[{}]", i64::MIN + 1));
    }

    #[test]
    fn test_namespace_from_kwargs() {
        let ctx = Context::new();
        let mut kwargs = IndexMap::new();
        kwargs.insert("count".to_string(), Value::Int(0));
        kwargs.insert("found".to_string(), Value::Bool(false));
        let ns = GLOBAL["namespace"](&FuncArgs::new("namespace", vec![], &ctx).with_kwargs(kwargs))
            .unwrap();
        assert_eq!(ns.to_string(), "{'count': 0, 'found': False}");
    }

    #[test]
    fn test_strftime_now_uses_context_clock() {
        let now = Local.with_ymd_and_hms(2024, 7, 26, 9, 5, 0).unwrap();
        let ctx = Context::with_clock(now);
        let out = call("strftime_now", vec![Value::string("%d %B %Y")], &ctx).unwrap();
        assert_eq!(out.to_string(), "26 July 2024");
    }
}
