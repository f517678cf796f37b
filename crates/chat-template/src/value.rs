/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The dynamic value model.
//!
//! [`Value`] is a closed sum type. Arrays and objects are shared handles:
//! cloning a [`Value::Array`] or [`Value::Object`] copies the handle, so a
//! mutation made through one binding is visible through every alias. All
//! other variants are plain values.

use crate::ast::MacroDef;
use crate::builtins::FuncArgs;
use crate::context::Context;
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Signature of every builtin function, filter and test.
pub type BuiltinFn = fn(&FuncArgs<'_>) -> JinjaResult<Value>;

/// A template value.
#[derive(Clone, Default)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(JinjaString),
    Bool(bool),
    None,
    #[default]
    Undefined,
    Array(Array),
    Object(Object),
    Function(Function),
}

// ============================================================================
// Shared containers
// ============================================================================

/// Shared, ordered sequence of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Snapshot of the items. Nested containers stay shared.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// True when both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared, insertion-ordered map from string keys to values.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<IndexMap<String, Value>>>);

impl Object {
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self(Rc::new(RefCell::new(entries)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn borrow(&self) -> Ref<'_, IndexMap<String, Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, IndexMap<String, Value>> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ============================================================================
// Functions
// ============================================================================

/// What a [`Function`] executes when called.
pub enum FunctionKind {
    Builtin {
        name: &'static str,
        func: BuiltinFn,
    },
    /// A macro (or a call block's `caller`) closing over its defining scope.
    Macro { def: Rc<MacroDef>, scope: Context },
}

/// A callable value, optionally bound to a receiver (`"abc".upper`).
#[derive(Clone)]
pub struct Function {
    kind: Rc<FunctionKind>,
    receiver: Option<Box<Value>>,
}

impl Function {
    pub fn builtin(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            kind: Rc::new(FunctionKind::Builtin { name, func }),
            receiver: None,
        }
    }

    pub fn macro_closure(def: Rc<MacroDef>, scope: Context) -> Self {
        Self {
            kind: Rc::new(FunctionKind::Macro { def, scope }),
            receiver: None,
        }
    }

    /// Bind `receiver` as the implicit first argument.
    pub fn bind(mut self, receiver: Value) -> Self {
        self.receiver = Some(Box::new(receiver));
        self
    }

    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_deref()
    }

    pub fn name(&self) -> &str {
        match self.kind.as_ref() {
            FunctionKind::Builtin { name, .. } => name,
            FunctionKind::Macro { def, .. } => &def.name,
        }
    }

    fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.kind, &other.kind)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

// ============================================================================
// Value
// ============================================================================

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(JinjaString::new(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Array::new(items))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Value::Object(Object::new(entries))
    }

    pub fn empty_object() -> Self {
        Value::Object(Object::default())
    }

    /// Short lowercase type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::None => "none",
            Value::Undefined => "undefined",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Python truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::None | Value::Undefined => false,
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_jinja_str(&self) -> Option<&JinjaString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for strings whose every part came from caller input.
    pub fn is_input_string(&self) -> bool {
        matches!(self, Value::String(s) if s.is_input())
    }

    /// Output form of the value. Strings keep their provenance.
    pub fn to_display(&self) -> JinjaString {
        match self {
            Value::String(s) => s.clone(),
            Value::Undefined => JinjaString::new(""),
            other => JinjaString::new(other.to_string()),
        }
    }

    // ------------------------------------------------------------------------
    // JSON conversion
    // ------------------------------------------------------------------------

    /// Convert JSON into a value. Strings are marked as template text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        Self::convert_json(json, false)
    }

    /// Convert JSON into a value, marking every string as caller input.
    pub fn from_json_input(json: &serde_json::Value) -> Self {
        Self::convert_json(json, true)
    }

    fn convert_json(json: &serde_json::Value, input: bool) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => {
                if input {
                    Value::String(JinjaString::input(s.as_str()))
                } else {
                    Value::string(s.as_str())
                }
            }
            serde_json::Value::Array(items) => Value::array(
                items
                    .iter()
                    .map(|item| Self::convert_json(item, input))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::convert_json(v, input)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Undefined and functions become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::None | Value::Undefined | Value::Function(_) => serde_json::Value::Null,
            Value::Array(a) => {
                serde_json::Value::Array(a.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(o) => serde_json::Value::Object(
                o.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Equality with template semantics.
///
/// Numbers compare numerically across int and float. A string compared with
/// a number compares against the number's display form, so `'1' == 1` holds.
/// Containers compare structurally; values of unrelated types are unequal.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (x, y) if x.is_numeric() && y.is_numeric() => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::String(s), n) | (n, Value::String(s)) if n.is_numeric() => {
            s.as_str() == n.to_string()
        }
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::None, Value::None) | (Value::Undefined, Value::Undefined) => true,
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| value_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| value_eq(v, other)))
        }
        (Value::Function(x), Value::Function(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Ordering for `<`, `>`, `sort`, `min` and `max`.
///
/// Strings and numbers order against each other by display form, matching
/// the equality rule above.
pub fn value_cmp(a: &Value, b: &Value) -> JinjaResult<Ordering> {
    let unsupported = || {
        JinjaError::type_error(format!(
            "comparison not supported between {} and {}",
            a.type_name(),
            b.type_name()
        ))
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (x, y) if x.is_numeric() && y.is_numeric() => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).ok_or_else(unsupported)
        }
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.as_str().cmp(&y.as_str())),
        (Value::String(s), n) if n.is_numeric() => Ok(str::cmp(&s.as_str(), &n.to_string())),
        (n, Value::String(s)) if n.is_numeric() => Ok(str::cmp(&n.to_string(), &s.as_str())),
        (Value::Array(x), Value::Array(y)) => {
            let (x, y) = (x.to_vec(), y.to_vec());
            for (l, r) in x.iter().zip(y.iter()) {
                match value_cmp(l, r)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(unsupported()),
    }
}

// ============================================================================
// Display
// ============================================================================

/// Format a float the way Python prints it (`1.0`, `0.5`, `inf`).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let s = if f > 0.0 { "inf" } else { "-inf" };
        s.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Python `repr` of a string.
fn repr_str(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_repr(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => repr_str(&s.as_str(), out),
        Value::Undefined => out.push_str("None"),
        other => out.push_str(&other.to_string()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::None => f.write_str("None"),
            Value::Undefined => Ok(()),
            Value::Array(a) => {
                let mut out = String::from("[");
                for (i, item) in a.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_repr(item, &mut out);
                }
                out.push(']');
                f.write_str(&out)
            }
            Value::Object(o) => {
                let mut out = String::from("{");
                for (i, (k, v)) in o.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    repr_str(k, &mut out);
                    out.push_str(": ");
                    write_repr(v, &mut out);
                }
                out.push('}');
                f.write_str(&out)
            }
            Value::Function(func) => write!(f, "<function {}>", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => {
                let mut out = String::new();
                repr_str(&s.as_str(), &mut out);
                f.write_str(&out)
            }
            Value::Undefined => f.write_str("Undefined"),
            other => write!(f, "{}", other),
        }
    }
}

/// Structural equality, used by tests and `unique`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<JinjaString> for Value {
    fn from(s: JinjaString) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_array_aliasing() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::Array(arr) = &b {
            arr.push(Value::Int(2));
        }
        assert_eq!(a.to_string(), "[1, 2]");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Undefined.to_string(), "");
        let v = Value::from_json(&json!({"a": [1, "x", null, true], "b": "it's"}));
        assert_eq!(v.to_string(), r#"{'a': [1, 'x', None, True], 'b': "it's"}"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::None.is_truthy());
        assert!(Value::from_json(&json!({"k": 1})).is_truthy());
    }

    #[test]
    fn test_equality() {
        assert!(value_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(value_eq(&Value::None, &Value::None));
        assert!(value_eq(&Value::Undefined, &Value::Undefined));
        assert!(!value_eq(&Value::None, &Value::Undefined));
        assert!(!value_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(value_eq(
            &Value::from_json(&json!({"a": [1, 2]})),
            &Value::from_json(&json!({"a": [1, 2]}))
        ));
    }

    #[test]
    fn test_string_number_comparison_uses_display_form() {
        assert!(value_eq(&Value::string("1"), &Value::Int(1)));
        assert!(!value_eq(&Value::string("1"), &Value::Float(1.0)));
        // lexical, not numeric
        assert_eq!(
            value_cmp(&Value::string("10"), &Value::Int(9)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_ordering_unsupported_pair() {
        assert!(value_cmp(&Value::None, &Value::Int(1)).is_err());
        assert_eq!(
            value_cmp(&Value::Int(2), &Value::Float(1.5)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let input = json!({"z": 1, "a": {"y": [1.5, null], "b": "s"}});
        let value = Value::from_json(&input);
        assert_eq!(value.to_json(), input);
        let keys: Vec<String> = match &value {
            Value::Object(o) => o.keys(),
            _ => vec![],
        };
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_from_json_input_marks_strings() {
        let v = Value::from_json_input(&json!({"content": "hi"}));
        let content = match &v {
            Value::Object(o) => o.get("content"),
            _ => None,
        };
        assert!(content.is_some_and(|c| c.is_input_string()));
        assert!(!Value::from_json(&json!("hi")).is_input_string());
    }
}
