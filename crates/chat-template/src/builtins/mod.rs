/*
 * builtins/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Builtin functions, filters and tests.
//!
//! Builtins are plain function pointers stored in per-type tables that are
//! built once and shared by every render. A member builtin such as
//! `"abc".upper()` receives its receiver as the first positional argument;
//! a filter receives its operand the same way, so one function serves both
//! spellings (`s.upper()` and `s | upper`).
//!
//! Lookup order:
//! - member access: the value's own table (after the container's own keys,
//!   which the interpreter checks first)
//! - filters: the value's own table, then the filters every value accepts
//!   (`default`), then the global table
//! - bare identifiers: the global table

mod array;
mod global;
mod json;
mod number;
mod object;
mod predicates;
mod string;
mod undefined;

use crate::config::Workarounds;
use crate::context::Context;
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use crate::value::{Array, BuiltinFn, Object, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub use json::{dump_json, JsonOptions};
pub(crate) use predicates::contains;

/// A table of builtins keyed by name.
pub type BuiltinTable = HashMap<&'static str, BuiltinFn>;

pub(crate) fn table(entries: &[(&'static str, BuiltinFn)]) -> BuiltinTable {
    entries.iter().copied().collect()
}

/// Filters every value accepts, consulted after the type's own table.
static COMMON_FILTERS: Lazy<BuiltinTable> = Lazy::new(|| table(&[("default", default_value)]));

// ============================================================================
// Arguments
// ============================================================================

/// Expected argument type for [`FuncArgs::ensure_vals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Any,
    Int,
    Float,
    Number,
    String,
    Bool,
    Array,
    Object,
}

impl Kind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Kind::Any => true,
            Kind::Int => matches!(value, Value::Int(_)),
            Kind::Float => matches!(value, Value::Float(_)),
            Kind::Number => value.is_numeric(),
            Kind::String => matches!(value, Value::String(_)),
            Kind::Bool => matches!(value, Value::Bool(_)),
            Kind::Array => matches!(value, Value::Array(_)),
            Kind::Object => matches!(value, Value::Object(_)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Any => "any value",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Bool => "bool",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }
}

/// Evaluated arguments of a builtin call.
///
/// For member builtins and filters, `args[0]` is the receiver.
pub struct FuncArgs<'a> {
    /// Name the builtin was invoked under.
    pub name: &'a str,
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
    pub ctx: &'a Context,
}

impl<'a> FuncArgs<'a> {
    pub fn new(name: &'a str, args: Vec<Value>, ctx: &'a Context) -> Self {
        Self {
            name,
            args,
            kwargs: IndexMap::new(),
            ctx,
        }
    }

    pub fn with_kwargs(mut self, kwargs: IndexMap<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Positional argument `index`, or Undefined.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Require between `min` and `max` positional arguments.
    pub fn ensure_count(&self, min: usize, max: usize) -> JinjaResult<()> {
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(JinjaError::type_error(format!(
                "{}: expected {} arguments, got {}",
                self.name, expected, n
            )));
        }
        Ok(())
    }

    /// Check positional argument types. Each entry is `(kind, required)`;
    /// optional positions are only checked when present.
    pub fn ensure_vals(&self, kinds: &[(Kind, bool)]) -> JinjaResult<()> {
        for (index, (kind, required)) in kinds.iter().enumerate() {
            match self.args.get(index) {
                Some(value) if !kind.accepts(value) => {
                    return Err(self.mismatch(index, kind.name(), value));
                }
                None if *required => {
                    return Err(JinjaError::type_error(format!(
                        "{}: missing required argument {}",
                        self.name, index
                    )));
                }
                _ => {}
            }
        }
        if self.args.len() > kinds.len() {
            return Err(JinjaError::type_error(format!(
                "{}: expected at most {} arguments, got {}",
                self.name,
                kinds.len(),
                self.args.len()
            )));
        }
        Ok(())
    }

    /// Keyword argument `name`, or Undefined.
    pub fn get_kwarg(&self, name: &str) -> Value {
        self.kwargs.get(name).cloned().unwrap_or_default()
    }

    /// Keyword argument `name`, falling back to positional `pos`.
    pub fn get_kwarg_or_pos(&self, name: &str, pos: usize) -> Value {
        match self.kwargs.get(name) {
            Some(value) => value.clone(),
            None => self.arg(pos),
        }
    }

    fn mismatch(&self, index: usize, expected: &str, got: &Value) -> JinjaError {
        JinjaError::type_error(format!(
            "{}: expected {} for argument {}, got {}",
            self.name,
            expected,
            index,
            got.type_name()
        ))
    }

    pub fn receiver_str(&self) -> JinjaResult<&JinjaString> {
        match self.args.first() {
            Some(Value::String(s)) => Ok(s),
            other => Err(self.mismatch(0, "string", other.unwrap_or(&Value::Undefined))),
        }
    }

    pub fn receiver_array(&self) -> JinjaResult<&Array> {
        match self.args.first() {
            Some(Value::Array(a)) => Ok(a),
            other => Err(self.mismatch(0, "array", other.unwrap_or(&Value::Undefined))),
        }
    }

    pub fn receiver_object(&self) -> JinjaResult<&Object> {
        match self.args.first() {
            Some(Value::Object(o)) => Ok(o),
            other => Err(self.mismatch(0, "object", other.unwrap_or(&Value::Undefined))),
        }
    }

    /// Optional integer argument. Undefined and None mean absent.
    pub fn opt_int(&self, name: &str, pos: usize) -> JinjaResult<Option<i64>> {
        match self.get_kwarg_or_pos(name, pos) {
            Value::Undefined | Value::None => Ok(None),
            Value::Int(i) => Ok(Some(i)),
            Value::Bool(b) => Ok(Some(b as i64)),
            other => Err(self.mismatch(pos, "int", &other)),
        }
    }

    /// Optional string argument. Undefined and None mean absent.
    pub fn opt_str(&self, name: &str, pos: usize) -> JinjaResult<Option<JinjaString>> {
        match self.get_kwarg_or_pos(name, pos) {
            Value::Undefined | Value::None => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(self.mismatch(pos, "string", &other)),
        }
    }

    /// Truthiness of an optional argument; absent is false.
    pub fn flag(&self, name: &str, pos: usize) -> bool {
        self.get_kwarg_or_pos(name, pos).is_truthy()
    }

    pub fn workarounds(&self) -> Workarounds {
        self.ctx.workarounds()
    }
}

// ============================================================================
// Lookup
// ============================================================================

fn type_table(value: &Value, workarounds: Workarounds) -> Option<&'static BuiltinTable> {
    match value {
        Value::Int(_) | Value::Float(_) => Some(&*number::NUMBER),
        Value::Bool(_) => Some(&*number::BOOL),
        Value::String(_) => Some(&*string::STRING),
        Value::Array(_) => Some(&*array::ARRAY),
        Value::Object(_) => Some(&*object::OBJECT),
        Value::None if workarounds.none_has_builtins => Some(&*undefined::NONE_EXTENDED),
        Value::None => Some(&*undefined::NONE),
        Value::Undefined => Some(&*undefined::UNDEFINED),
        Value::Function(_) => None,
    }
}

fn find(table: &'static BuiltinTable, name: &str) -> Option<(&'static str, BuiltinFn)> {
    table.get_key_value(name).map(|(k, f)| (*k, *f))
}

/// Builtin reachable as `value.name`.
pub fn lookup_member(
    value: &Value,
    name: &str,
    workarounds: Workarounds,
) -> Option<(&'static str, BuiltinFn)> {
    type_table(value, workarounds).and_then(|t| find(t, name))
}

/// Builtin applied by `value | name`.
pub fn lookup_filter(
    value: &Value,
    name: &str,
    workarounds: Workarounds,
) -> Option<(&'static str, BuiltinFn)> {
    lookup_member(value, name, workarounds)
        .or_else(|| find(&COMMON_FILTERS, name))
        .or_else(|| find(&global::GLOBAL, name))
}

/// Builtin bound to a bare identifier.
pub fn lookup_global(name: &str) -> Option<(&'static str, BuiltinFn)> {
    find(&global::GLOBAL, name)
}

/// Test applied by `value is name`.
pub fn lookup_test(name: &str) -> Option<(&'static str, BuiltinFn)> {
    find(&predicates::TESTS, name)
}

/// Apply the filter `name` to `value` with extra positional arguments.
pub(crate) fn apply_filter(
    ctx: &Context,
    name: &str,
    value: Value,
    extra: &[Value],
) -> JinjaResult<Value> {
    let (name, func) = lookup_filter(&value, name, ctx.workarounds()).ok_or_else(|| {
        JinjaError::type_error(format!("unknown filter '{}' for type {}", name, value.type_name()))
    })?;
    let mut args = vec![value];
    args.extend_from_slice(extra);
    func(&FuncArgs::new(name, args, ctx))
}

/// Run the test `name` against `value` with extra positional arguments.
pub(crate) fn apply_test(
    ctx: &Context,
    name: &str,
    value: Value,
    extra: &[Value],
) -> JinjaResult<bool> {
    let (name, func) = lookup_test(name)
        .ok_or_else(|| JinjaError::type_error(format!("unknown test '{}'", name)))?;
    let mut args = vec![value];
    args.extend_from_slice(extra);
    Ok(func(&FuncArgs::new(name, args, ctx))?.is_truthy())
}

// ============================================================================
// Shared helpers
// ============================================================================

/// `default(value, default_value='', boolean=false)`
///
/// Returns the default when the value is undefined (or none), or when
/// `boolean` is set and the value is falsy.
fn default_value(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 3)?;
    let value = args.arg(0);
    let fallback = match args.get_kwarg_or_pos("default_value", 1) {
        Value::Undefined => Value::string(""),
        other => other,
    };
    let missing = if args.flag("boolean", 2) {
        !value.is_truthy()
    } else {
        value.is_undefined() || value.is_none()
    };
    Ok(if missing { fallback } else { value })
}

/// Follow a dotted attribute path (`"function.name"`, `"items.0"`).
/// Missing steps yield Undefined.
pub(crate) fn attribute(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match &current {
            Value::Object(o) => o.get(segment).unwrap_or_default(),
            Value::Array(a) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| a.get(i))
                .unwrap_or_default(),
            _ => Value::Undefined,
        };
    }
    current
}

/// Indices selected by a Python slice over a sequence of length `len`.
pub(crate) fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> JinjaResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(JinjaError::type_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |i: i64| {
            if i < 0 {
                i.saturating_add(len).max(0)
            } else {
                i.min(len)
            }
        };
        let start = start.map(clamp).unwrap_or(0);
        let stop = stop.map(clamp).unwrap_or(len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let clamp = |i: i64| {
            if i < 0 {
                i.saturating_add(len).max(-1)
            } else {
                i.min(len - 1)
            }
        };
        let start = start.map(clamp).unwrap_or(len - 1);
        let stop = stop.map(clamp).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    Ok(out)
}

/// Python slice of a string or array. Strings slice by character and keep
/// the provenance of the characters they contain.
pub(crate) fn slice_value(
    value: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> JinjaResult<Value> {
    match value {
        Value::Array(a) => {
            let items = a.borrow();
            let picked = slice_indices(items.len(), start, stop, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::array(picked))
        }
        Value::String(s) => {
            let text = s.as_str();
            let bounds: Vec<(usize, usize)> = text
                .char_indices()
                .map(|(i, c)| (i, i + c.len_utf8()))
                .collect();
            let indices = slice_indices(bounds.len(), start, stop, step)?;
            let contiguous = indices.windows(2).all(|w| w[1] == w[0] + 1);
            let out = match (indices.first(), indices.last()) {
                (Some(&first), Some(&last)) if contiguous => {
                    s.substring(bounds[first].0..bounds[last].1)
                }
                (Some(_), Some(_)) => {
                    let mut out = JinjaString::default();
                    for i in indices {
                        out.append(&s.substring(bounds[i].0..bounds[i].1));
                    }
                    out
                }
                _ => s.substring(0..0),
            };
            Ok(Value::String(out))
        }
        other => Err(JinjaError::type_error(format!(
            "cannot slice a value of type {}",
            other.type_name()
        ))),
    }
}

/// `slice(start, stop, step)` member on strings and arrays.
fn slice(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(2, 4)?;
    let (start, stop, step) = if args.args.len() == 2 {
        (None, args.opt_int("stop", 1)?, None)
    } else {
        (
            args.opt_int("start", 1)?,
            args.opt_int("stop", 2)?,
            args.opt_int("step", 3)?,
        )
    };
    slice_value(&args.arg(0), start, stop, step)
}

fn length(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 1)?;
    let n = match &args.args[0] {
        Value::String(s) => s.char_count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Undefined => 0,
        other => {
            return Err(JinjaError::type_error(format!(
                "object of type {} has no length",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn to_string(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 1)?;
    Ok(Value::String(args.args[0].to_display()))
}

fn tojson(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 5)?;
    let options = JsonOptions::from_args(args)?;
    Ok(Value::string(dump_json(&args.args[0], &options)?))
}

/// Case-folded comparison key used by `sort`, `unique`, `min`, `max` and
/// `dictsort` when `case_sensitive` is false.
pub(crate) fn fold_case(value: Value, case_sensitive: bool) -> Value {
    match value {
        Value::String(s) if !case_sensitive => Value::String(s.to_lowercase()),
        other => other,
    }
}
