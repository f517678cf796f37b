/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Variable scopes for template rendering.
//!
//! A [`Context`] maps names to values and carries the per-render state that
//! builtins need: the fixed clock used by `strftime_now`, the active
//! [`Workarounds`], and a record of array-style operations applied to
//! caller-input strings (read by the capability prober).
//!
//! Child scopes copy the parent's bindings, so rebinding a name in a loop or
//! macro body stays local. Arrays and objects are shared handles and
//! mutations to them remain visible everywhere.

use crate::config::Workarounds;
use crate::error::{JinjaError, JinjaResult};
use crate::value::Value;
use chrono::{DateTime, Local};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// Array-style operations recorded when applied to caller-input strings.
pub const OP_ARRAY_ACCESS: &str = "array_access";
pub const OP_SELECTATTR: &str = "selectattr";
pub const OP_ITERATE: &str = "iterate";

#[derive(Clone)]
struct RenderState {
    now: DateTime<Local>,
    workarounds: Workarounds,
    input_ops: Rc<RefCell<BTreeSet<&'static str>>>,
}

/// Name bindings plus per-render state.
#[derive(Clone)]
pub struct Context {
    vars: Rc<RefCell<HashMap<String, Value>>>,
    state: Rc<RenderState>,
}

impl Context {
    /// A fresh context with `true`/`false`/`none` (and the capitalized
    /// forms) bound, using the current local time as its clock.
    pub fn new() -> Self {
        Self::with_clock(Local::now())
    }

    /// A fresh context whose `strftime_now` always reports `now`.
    pub fn with_clock(now: DateTime<Local>) -> Self {
        let mut vars = HashMap::new();
        for (name, value) in [
            ("true", Value::Bool(true)),
            ("True", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("False", Value::Bool(false)),
            ("none", Value::None),
            ("None", Value::None),
        ] {
            vars.insert(name.to_string(), value);
        }
        Self {
            vars: Rc::new(RefCell::new(vars)),
            state: Rc::new(RenderState {
                now,
                workarounds: Workarounds::default(),
                input_ops: Rc::new(RefCell::new(BTreeSet::new())),
            }),
        }
    }

    /// Build a context from a JSON object. Strings are template text.
    pub fn from_json(json: &serde_json::Value) -> JinjaResult<Self> {
        let mut ctx = Self::new();
        ctx.merge_json(json, false)?;
        Ok(ctx)
    }

    /// Build a context from a JSON object, marking every string as input.
    pub fn from_json_input(json: &serde_json::Value) -> JinjaResult<Self> {
        let mut ctx = Self::new();
        ctx.merge_json(json, true)?;
        Ok(ctx)
    }

    /// Bind every top-level key of a JSON object.
    pub fn merge_json(&mut self, json: &serde_json::Value, input: bool) -> JinjaResult<()> {
        let serde_json::Value::Object(map) = json else {
            return Err(JinjaError::type_error(
                "context must be built from a JSON object",
            ));
        };
        for (key, value) in map {
            let value = if input {
                Value::from_json_input(value)
            } else {
                Value::from_json(value)
            };
            self.set(key.clone(), value);
        }
        Ok(())
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn set_json(&mut self, name: impl Into<String>, json: &serde_json::Value) {
        self.set(name, Value::from_json(json));
    }

    /// Bind `json` with every string marked as caller input.
    pub fn set_json_input(&mut self, name: impl Into<String>, json: &serde_json::Value) {
        self.set(name, Value::from_json_input(json));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// A child scope holding a copy of the current bindings.
    pub fn child(&self) -> Context {
        Context {
            vars: Rc::new(RefCell::new(self.vars.borrow().clone())),
            state: Rc::clone(&self.state),
        }
    }

    /// The top-level scope for one render: a child of `self` running under
    /// `workarounds`. Input-operation records stay shared with `self`.
    pub(crate) fn render_scope(&self, workarounds: Workarounds) -> Context {
        let mut state = (*self.state).clone();
        state.workarounds = workarounds;
        Context {
            vars: Rc::new(RefCell::new(self.vars.borrow().clone())),
            state: Rc::new(state),
        }
    }

    pub fn now(&self) -> DateTime<Local> {
        self.state.now
    }

    pub fn workarounds(&self) -> Workarounds {
        self.state.workarounds
    }

    /// Note that `op` was applied to a caller-input string.
    pub fn record_input_op(&self, op: &'static str) {
        let inserted = self.state.input_ops.borrow_mut().insert(op);
        if inserted {
            tracing::trace!(op, "array-style operation on input string");
        }
    }

    /// Operations recorded so far, sorted by name.
    pub fn input_ops(&self) -> Vec<&'static str> {
        self.state.input_ops.borrow().iter().copied().collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars = self.vars.borrow();
        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();
        f.debug_struct("Context")
            .field("vars", &names)
            .field("now", &self.state.now)
            .finish()
    }
}
