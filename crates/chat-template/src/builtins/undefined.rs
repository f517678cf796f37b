/*
 * builtins/undefined.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Builtins on none and undefined.

use super::{length, table, to_string, tojson, BuiltinTable, FuncArgs};
use crate::error::JinjaResult;
use crate::value::Value;
use once_cell::sync::Lazy;

pub(super) static NONE: Lazy<BuiltinTable> =
    Lazy::new(|| table(&[("tojson", tojson), ("string", to_string)]));

/// None with the `none_has_builtins` workaround: behaves like an empty
/// sequence for the filters templates apply to optional fields.
pub(super) static NONE_EXTENDED: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("tojson", tojson),
        ("string", to_string),
        ("list", empty_array),
        ("selectattr", empty_array),
        ("rejectattr", empty_array),
    ])
});

pub(super) static UNDEFINED: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("tojson", tojson),
        ("string", to_string),
        ("list", empty_array),
        ("length", length),
    ])
});

fn empty_array(_: &FuncArgs<'_>) -> JinjaResult<Value> {
    Ok(Value::array(vec![]))
}
