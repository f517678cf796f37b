/*
 * builtins/json.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JSON serialization for `tojson`.
//!
//! Output follows Python's `json.dumps` layout rather than serde_json's, since
//! chat templates are written against the former: `", "` and `": "`
//! separators by default, Python float formatting, and `indent` producing one
//! item per line. Serialization runs through serde_json with a custom
//! [`Formatter`] supplying that layout.

use super::FuncArgs;
use crate::error::{JinjaError, JinjaResult};
use crate::value::{format_float, Value};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::Formatter;
use std::io;

/// Layout options for [`dump_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonOptions {
    /// Per-level indentation. `None` keeps everything on one line.
    pub indent: Option<String>,
    pub item_separator: String,
    pub key_separator: String,
    pub ensure_ascii: bool,
    pub sort_keys: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            indent: None,
            item_separator: ", ".to_string(),
            key_separator: ": ".to_string(),
            ensure_ascii: false,
            sort_keys: false,
        }
    }
}

impl JsonOptions {
    /// Read `tojson(value, indent, separators, ensure_ascii, sort_keys)`.
    pub(crate) fn from_args(args: &FuncArgs<'_>) -> JinjaResult<Self> {
        let indent = match args.get_kwarg_or_pos("indent", 1) {
            Value::Undefined | Value::None => None,
            Value::Int(n) => Some(" ".repeat(n.max(0) as usize)),
            Value::String(s) => Some(s.to_string()),
            other => {
                return Err(JinjaError::type_error(format!(
                    "tojson: indent must be an int or string, got {}",
                    other.type_name()
                )))
            }
        };

        let (item_separator, key_separator) = match args.get_kwarg_or_pos("separators", 2) {
            Value::Undefined | Value::None => {
                let item = if indent.is_some() { "," } else { ", " };
                (item.to_string(), ": ".to_string())
            }
            Value::Array(pair) if pair.len() == 2 => {
                let pair = pair.to_vec();
                (pair[0].to_display().to_string(), pair[1].to_display().to_string())
            }
            other => {
                return Err(JinjaError::type_error(format!(
                    "tojson: separators must be a pair of strings, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            indent,
            item_separator,
            key_separator,
            ensure_ascii: args.flag("ensure_ascii", 3),
            sort_keys: args.flag("sort_keys", 4),
        })
    }
}

/// Serialize `value`. Undefined, none, functions and non-finite floats
/// become `null`.
pub fn dump_json(value: &Value, options: &JsonOptions) -> JinjaResult<String> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PythonFormatter::new(options));
    Dump {
        value,
        sort_keys: options.sort_keys,
    }
    .serialize(&mut serializer)
    .map_err(|e| JinjaError::type_error(format!("tojson: {}", e)))?;
    String::from_utf8(buf).map_err(|e| JinjaError::type_error(format!("tojson: {}", e)))
}

/// A template value viewed through serde.
struct Dump<'a> {
    value: &'a Value,
    sort_keys: bool,
}

impl Dump<'_> {
    fn nested<'v>(&self, value: &'v Value) -> Dump<'v> {
        Dump {
            value,
            sort_keys: self.sort_keys,
        }
    }
}

impl Serialize for Dump<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::None | Value::Undefined | Value::Function(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(&s.as_str()),
            Value::Array(a) => {
                let items = a.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(&self.nested(item))?;
                }
                seq.end()
            }
            Value::Object(o) => {
                let mut entries = o.entries();
                if self.sort_keys {
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                }
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in &entries {
                    map.serialize_entry(key, &self.nested(item))?;
                }
                map.end()
            }
        }
    }
}

/// `json.dumps` layout: configurable separators and indent unit, Python
/// float repr, optional `\uXXXX` escaping of non-ASCII characters.
struct PythonFormatter<'a> {
    options: &'a JsonOptions,
    level: usize,
    has_value: bool,
}

impl<'a> PythonFormatter<'a> {
    fn new(options: &'a JsonOptions) -> Self {
        Self {
            options,
            level: 0,
            has_value: false,
        }
    }

    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        if let Some(unit) = &self.options.indent {
            writer.write_all(b"\n")?;
            for _ in 0..self.level {
                writer.write_all(unit.as_bytes())?;
            }
        }
        Ok(())
    }

    fn open<W: ?Sized + io::Write>(&mut self, writer: &mut W, bracket: &[u8]) -> io::Result<()> {
        self.level += 1;
        self.has_value = false;
        writer.write_all(bracket)
    }

    fn close<W: ?Sized + io::Write>(&mut self, writer: &mut W, bracket: &[u8]) -> io::Result<()> {
        self.level -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(bracket)
    }

    fn item<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if !first {
            writer.write_all(self.options.item_separator.as_bytes())?;
        }
        self.newline(writer)
    }
}

impl Formatter for PythonFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.open(writer, b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.item(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.open(writer, b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.close(writer, b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.item(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.options.key_separator.as_bytes())
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(format_float(value).as_bytes())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if !self.options.ensure_ascii || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}
