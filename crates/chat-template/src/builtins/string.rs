/*
 * builtins/string.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! String builtins.
//!
//! Results keep the provenance of the characters they are made of; see
//! [`crate::string`].

use super::number::{to_float, to_int};
use super::{length, slice, table, tojson, BuiltinTable, FuncArgs, Kind};
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use crate::value::Value;
use once_cell::sync::Lazy;

pub(super) static STRING: Lazy<BuiltinTable> = Lazy::new(|| {
    table(&[
        ("upper", upper),
        ("lower", lower),
        ("strip", strip),
        ("trim", strip),
        ("lstrip", lstrip),
        ("rstrip", rstrip),
        ("title", title),
        ("capitalize", capitalize),
        ("length", length),
        ("count", count),
        ("startswith", startswith),
        ("endswith", endswith),
        ("split", split),
        ("rsplit", rsplit),
        ("replace", replace),
        ("int", to_int),
        ("float", to_float),
        ("string", identity),
        ("safe", identity),
        ("list", list),
        ("first", first),
        ("last", last),
        ("slice", slice),
        ("indent", indent),
        ("join", join),
        ("tojson", tojson),
        ("format", not_implemented),
        ("wordwrap", not_implemented),
        ("urlize", not_implemented),
    ])
});

fn unary(args: &FuncArgs<'_>, f: impl FnOnce(&JinjaString) -> JinjaString) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    Ok(Value::String(f(args.receiver_str()?)))
}

fn upper(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    unary(args, JinjaString::to_uppercase)
}

fn lower(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    unary(args, JinjaString::to_lowercase)
}

fn title(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    unary(args, JinjaString::title)
}

fn capitalize(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    unary(args, JinjaString::capitalize)
}

fn identity(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    unary(args, JinjaString::clone)
}

fn strip_with(args: &FuncArgs<'_>, left: bool, right: bool) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true), (Kind::Any, false)])?;
    let chars = args.opt_str("chars", 1)?.map(|s| s.to_string());
    Ok(Value::String(
        args.receiver_str()?.strip(left, right, chars.as_deref()),
    ))
}

fn strip(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    strip_with(args, true, true)
}

fn lstrip(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    strip_with(args, true, false)
}

fn rstrip(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    strip_with(args, false, true)
}

/// `count(sub)` counts occurrences; as a bare filter it is the length.
fn count(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true), (Kind::String, false)])?;
    match args.args.get(1) {
        Some(needle) => {
            let haystack = args.receiver_str()?.as_str();
            let needle = needle.to_string();
            let n = if needle.is_empty() {
                haystack.chars().count() + 1
            } else {
                haystack.matches(needle.as_str()).count()
            };
            Ok(Value::Int(n as i64))
        }
        None => length(args),
    }
}

/// Prefixes (or suffixes) given as one string or an array of strings.
fn affixes(args: &FuncArgs<'_>) -> JinjaResult<Vec<String>> {
    match &args.args[1] {
        Value::String(s) => Ok(vec![s.to_string()]),
        Value::Array(items) => Ok(items.borrow().iter().map(|v| v.to_string()).collect()),
        other => Err(JinjaError::type_error(format!(
            "{}: expected string or array, got {}",
            args.name,
            other.type_name()
        ))),
    }
}

fn startswith(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true), (Kind::Any, true)])?;
    let text = args.receiver_str()?.as_str();
    Ok(Value::Bool(
        affixes(args)?.iter().any(|p| text.starts_with(p.as_str())),
    ))
}

fn endswith(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true), (Kind::Any, true)])?;
    let text = args.receiver_str()?.as_str();
    Ok(Value::Bool(
        affixes(args)?.iter().any(|s| text.ends_with(s.as_str())),
    ))
}

fn split_args(args: &FuncArgs<'_>) -> JinjaResult<(Option<String>, Option<usize>)> {
    args.ensure_count(1, 3)?;
    let sep = args.opt_str("sep", 1)?.map(|s| s.to_string());
    if sep.as_deref() == Some("") {
        return Err(JinjaError::type_error(format!("{}: empty separator", args.name)));
    }
    let max_split = args
        .opt_int("maxsplit", 2)?
        .and_then(|n| usize::try_from(n).ok());
    Ok((sep, max_split))
}

fn pieces(parts: Vec<JinjaString>) -> Value {
    Value::array(parts.into_iter().map(Value::String).collect())
}

/// `split(sep=None, maxsplit=-1)`
fn split(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    let (sep, max_split) = split_args(args)?;
    Ok(pieces(args.receiver_str()?.split(sep.as_deref(), max_split)))
}

fn rsplit(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    let (sep, max_split) = split_args(args)?;
    Ok(pieces(args.receiver_str()?.rsplit(sep.as_deref(), max_split)))
}

/// `replace(old, new, count=None)`
fn replace(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[
        (Kind::String, true),
        (Kind::String, true),
        (Kind::String, true),
        (Kind::Int, false),
    ])?;
    let from = args.args[1].to_string();
    let to = args.args[2].to_string();
    let count = args
        .opt_int("count", 3)?
        .and_then(|n| usize::try_from(n).ok());
    Ok(Value::String(args.receiver_str()?.replace(&from, &to, count)))
}

fn list(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    Ok(pieces(args.receiver_str()?.chars()))
}

fn first(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    Ok(args
        .receiver_str()?
        .chars()
        .into_iter()
        .next()
        .map(Value::String)
        .unwrap_or_default())
}

fn last(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true)])?;
    Ok(args
        .receiver_str()?
        .chars()
        .pop()
        .map(Value::String)
        .unwrap_or_default())
}

/// `indent(width=4, first=False, blank=False)`
///
/// Indents every line after the first; `first` also indents the first line
/// and `blank` also indents empty lines. `width` may be a string.
fn indent(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_count(1, 4)?;
    let text = args.receiver_str()?;
    let prefix = match args.get_kwarg_or_pos("width", 1) {
        Value::Undefined | Value::None => "    ".to_string(),
        Value::Int(n) => " ".repeat(n.max(0) as usize),
        Value::String(s) => s.to_string(),
        other => {
            return Err(JinjaError::type_error(format!(
                "indent: width must be an int or string, got {}",
                other.type_name()
            )))
        }
    };
    let indent_first = args.flag("first", 2);
    let indent_blank = args.flag("blank", 3);

    let mut out = JinjaString::default();
    for (i, line) in text.split(Some("\n"), None).iter().enumerate() {
        if i > 0 {
            out.push_template("\n");
        }
        let wanted = if i == 0 { indent_first } else { true };
        if wanted && (indent_blank || !line.is_empty()) {
            out.push_template(&prefix);
        }
        out.append(line);
    }
    if out.parts().is_empty() {
        return Ok(Value::String(text.substring(0..0)));
    }
    Ok(Value::String(out))
}

/// Join the characters of the string with a separator.
fn join(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    args.ensure_vals(&[(Kind::String, true), (Kind::String, false)])?;
    let sep = match args.args.get(1) {
        Some(Value::String(s)) => s.clone(),
        _ => JinjaString::new(""),
    };
    let mut out = JinjaString::default();
    for (i, c) in args.receiver_str()?.chars().iter().enumerate() {
        if i > 0 {
            out.append(&sep);
        }
        out.append(c);
    }
    if out.parts().is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::String(out))
}

fn not_implemented(args: &FuncArgs<'_>) -> JinjaResult<Value> {
    Err(JinjaError::not_implemented(format!(
        "string builtin '{}' is not implemented",
        args.name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::apply_filter;
    use crate::context::Context;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn filter(name: &str, value: Value, extra: Vec<Value>) -> JinjaResult<Value> {
        apply_filter(&Context::new(), name, value, &extra)
    }

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    fn input(text: &str) -> Value {
        Value::String(JinjaString::input(text))
    }

    // ========================================================================
    // Case and whitespace
    // ========================================================================

    #[test]
    fn test_case_conversions() {
        assert_eq!(filter("upper", s("abc"), vec![]).unwrap(), s("ABC"));
        assert_eq!(filter("title", s("hello wORLD"), vec![]).unwrap(), s("Hello World"));
        assert_eq!(filter("capitalize", s("hELLO"), vec![]).unwrap(), s("Hello"));
        assert!(filter("upper", input("x"), vec![]).unwrap().is_input_string());
    }

    #[test]
    fn test_strip_family() {
        assert_eq!(filter("strip", s("  a b \n"), vec![]).unwrap(), s("a b"));
        assert_eq!(filter("trim", s("xxaxx"), vec![s("x")]).unwrap(), s("a"));
        assert_eq!(filter("lstrip", s("  a "), vec![]).unwrap(), s("a "));
        assert_eq!(filter("rstrip", s("  a "), vec![]).unwrap(), s("  a"));
        assert!(filter("strip", input("  q  "), vec![]).unwrap().is_input_string());
    }

    // ========================================================================
    // Searching and splitting
    // ========================================================================

    #[test]
    fn test_startswith_endswith() {
        assert_eq!(filter("startswith", s("<think>x"), vec![s("<think>")]).unwrap(), Value::Bool(true));
        assert_eq!(filter("endswith", s("abc"), vec![s("b")]).unwrap(), Value::Bool(false));
        let options = Value::array(vec![s("x"), s("c")]);
        assert_eq!(filter("endswith", s("abc"), vec![options]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_split_and_rsplit() {
        let out = filter("split", s("a</think>b</think>c"), vec![s("</think>")]).unwrap();
        assert_eq!(out.to_string(), "['a', 'b', 'c']");

        let out = filter("split", s("  a  b "), vec![]).unwrap();
        assert_eq!(out.to_string(), "['a', 'b']");

        let out = filter("rsplit", s("a,b,c"), vec![s(","), Value::Int(1)]).unwrap();
        assert_eq!(out.to_string(), "['a,b', 'c']");

        let out = filter("split", input("x y"), vec![]).unwrap();
        if let Value::Array(items) = out {
            assert!(items.borrow().iter().all(Value::is_input_string));
        }
    }

    #[test]
    fn test_replace_and_count() {
        assert_eq!(filter("replace", s("aaa"), vec![s("a"), s("b")]).unwrap(), s("bbb"));
        assert_eq!(
            filter("replace", s("aaa"), vec![s("a"), s("b"), Value::Int(2)]).unwrap(),
            s("bba")
        );
        assert_eq!(filter("count", s("banana"), vec![s("an")]).unwrap(), Value::Int(2));
        assert_eq!(filter("count", s("banana"), vec![]).unwrap(), Value::Int(6));
    }

    // ========================================================================
    // Sequence-like access
    // ========================================================================

    #[test]
    fn test_list_first_last() {
        assert_eq!(filter("list", s("ab"), vec![]).unwrap().to_string(), "['a', 'b']");
        assert_eq!(filter("first", s("ab"), vec![]).unwrap(), s("a"));
        assert_eq!(filter("last", s("ab"), vec![]).unwrap(), s("b"));
        assert!(filter("first", s(""), vec![]).unwrap().is_undefined());
    }

    #[test]
    fn test_slice_member() {
        assert_eq!(filter("slice", s("hello"), vec![Value::Int(1), Value::Int(3)]).unwrap(), s("el"));
        assert_eq!(filter("slice", s("hello"), vec![Value::Int(2)]).unwrap(), s("he"));
    }

    #[test]
    fn test_join_characters() {
        assert_eq!(filter("join", s("abc"), vec![s("-")]).unwrap(), s("a-b-c"));
        assert_eq!(filter("join", s(""), vec![s("-")]).unwrap(), s(""));
    }

    #[test]
    fn test_indent() {
        let text = s("a\nb\n\nc");
        assert_eq!(filter("indent", text.clone(), vec![Value::Int(2)]).unwrap(), s("a\n  b\n\n  c"));
        assert_eq!(
            filter("indent", text.clone(), vec![Value::Int(2), Value::Bool(true), Value::Bool(true)]).unwrap(),
            s("  a\n  b\n  \n  c")
        );
        assert_eq!(filter("indent", s("x"), vec![s("> "), Value::Bool(true)]).unwrap(), s("> x"));
    }

    #[test]
    fn test_not_implemented() {
        let err = filter("wordwrap", s("x"), vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }
}
