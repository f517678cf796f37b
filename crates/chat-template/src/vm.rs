/*
 * vm.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-walking interpreter.
//!
//! Statements execute into a provenance-tagged output string; expressions
//! evaluate to [`Value`]s. Failures propagate as `Result` and are wrapped
//! once with the kind and offset of the innermost failing node.
//! `break` and `continue` travel as [`Unwind`] signals that the nearest
//! enclosing loop consumes.

use crate::ast::{
    BinaryOp, CallStmt, Expr, ExprKind, FilterCall, FilterStmt, ForStmt, IfStmt, MacroDef,
    Program, SetStmt, Stmt, UnaryOp,
};
use crate::builtins::{
    apply_test, contains, lookup_filter, lookup_global, lookup_member, slice_value, FuncArgs,
};
use crate::context::{Context, OP_ARRAY_ACCESS, OP_ITERATE, OP_SELECTATTR};
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use crate::value::{value_cmp, value_eq, Function, FunctionKind, Value};
use indexmap::IndexMap;
use std::rc::Rc;

/// Non-local exits out of a statement list.
#[derive(Debug)]
pub(crate) enum Unwind {
    Break(usize),
    Continue(usize),
    Error(JinjaError),
}

impl From<JinjaError> for Unwind {
    fn from(err: JinjaError) -> Self {
        Unwind::Error(err)
    }
}

impl Unwind {
    /// Turn a signal that escaped every loop into an error.
    fn into_error(self) -> JinjaError {
        match self {
            Unwind::Break(offset) => JinjaError::type_error("'break' outside of a loop")
                .at_node("BreakStatement", offset),
            Unwind::Continue(offset) => JinjaError::type_error("'continue' outside of a loop")
                .at_node("ContinueStatement", offset),
            Unwind::Error(err) => err,
        }
    }
}

type Exec<T> = Result<T, Unwind>;

/// Execute `program` in `ctx` and return its output.
///
/// Runs in a child of `ctx`, so top-level assignments stay inside the render.
pub fn execute(program: &Program, ctx: &Context) -> JinjaResult<JinjaString> {
    let mut scope = ctx.child();
    let mut out = JinjaString::default();
    exec_block(&program.body, &mut scope, &mut out).map_err(Unwind::into_error)?;
    Ok(out)
}

/// Run a body that is not a loop body, so stray `break`/`continue` fail.
fn render_body(body: &[Stmt], ctx: &mut Context) -> JinjaResult<JinjaString> {
    let mut out = JinjaString::default();
    exec_block(body, ctx, &mut out).map_err(Unwind::into_error)?;
    Ok(out)
}

fn exec_block(body: &[Stmt], ctx: &mut Context, out: &mut JinjaString) -> Exec<()> {
    for stmt in body {
        exec_stmt(stmt, ctx, out).map_err(|unwind| match unwind {
            Unwind::Error(err) => Unwind::Error(err.at_node(stmt.node_name(), stmt.offset())),
            signal => signal,
        })?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, ctx: &mut Context, out: &mut JinjaString) -> Exec<()> {
    match stmt {
        Stmt::Text(text) => out.push_template(&text.text),
        Stmt::Comment(_) => {}
        Stmt::Output(expr) => out.append(&eval(expr, ctx)?.to_display()),
        Stmt::If(stmt) => exec_if(stmt, ctx, out)?,
        Stmt::For(stmt) => exec_for(stmt, ctx, out)?,
        Stmt::Set(stmt) => exec_set(stmt, ctx)?,
        Stmt::Macro(def) => {
            let closure = Function::macro_closure(Rc::clone(def), ctx.clone());
            ctx.set(def.name.clone(), Value::Function(closure));
        }
        Stmt::Call(stmt) => out.append(&exec_call_block(stmt, ctx)?.to_display()),
        Stmt::Filter(stmt) => out.append(&exec_filter_block(stmt, ctx)?.to_display()),
        Stmt::Break(offset) => return Err(Unwind::Break(*offset)),
        Stmt::Continue(offset) => return Err(Unwind::Continue(*offset)),
    }
    Ok(())
}

fn exec_if(stmt: &IfStmt, ctx: &mut Context, out: &mut JinjaString) -> Exec<()> {
    if eval(&stmt.test, ctx)?.is_truthy() {
        exec_block(&stmt.body, ctx, out)
    } else {
        exec_block(&stmt.else_body, ctx, out)
    }
}

// ============================================================================
// Loops
// ============================================================================

/// Items produced by iterating `value`. Objects yield keys, or `[key, value]`
/// pairs when `pairs` is set.
fn iteration_items(value: Value, pairs: bool, ctx: &Context) -> JinjaResult<Vec<Value>> {
    match value {
        Value::Array(a) => Ok(a.to_vec()),
        Value::Object(o) if pairs => Ok(o
            .entries()
            .into_iter()
            .map(|(k, v)| Value::array(vec![Value::string(k), v]))
            .collect()),
        Value::Object(o) => Ok(o.keys().into_iter().map(Value::string).collect()),
        Value::String(s) => {
            if s.is_input() {
                ctx.record_input_op(OP_ITERATE);
            }
            Ok(s.chars().into_iter().map(Value::String).collect())
        }
        Value::Undefined => Ok(Vec::new()),
        other => Err(JinjaError::type_error(format!(
            "cannot iterate over a value of type {}",
            other.type_name()
        ))),
    }
}

/// Bind a loop or assignment target.
fn bind_target(target: &Expr, value: Value, ctx: &mut Context) -> JinjaResult<()> {
    match &target.kind {
        ExprKind::Identifier(name) => {
            ctx.set(name.clone(), value);
            Ok(())
        }
        ExprKind::Tuple(names) => {
            let items = match &value {
                Value::Array(a) => a.to_vec(),
                other => {
                    return Err(JinjaError::type_error(format!(
                        "cannot unpack a value of type {}",
                        other.type_name()
                    )))
                }
            };
            if items.len() != names.len() {
                return Err(JinjaError::type_error(format!(
                    "expected {} values to unpack, got {}",
                    names.len(),
                    items.len()
                )));
            }
            for (name, item) in names.iter().zip(items) {
                bind_target(name, item, ctx)?;
            }
            Ok(())
        }
        _ => Err(JinjaError::type_error(format!(
            "cannot assign to {}",
            target.node_name()
        ))),
    }
}

fn loop_object(index: usize, items: &[Value]) -> Value {
    let len = items.len();
    let mut entries = IndexMap::new();
    entries.insert("index".to_string(), Value::Int(index as i64 + 1));
    entries.insert("index0".to_string(), Value::Int(index as i64));
    entries.insert("revindex".to_string(), Value::Int((len - index) as i64));
    entries.insert("revindex0".to_string(), Value::Int((len - index - 1) as i64));
    entries.insert("first".to_string(), Value::Bool(index == 0));
    entries.insert("last".to_string(), Value::Bool(index + 1 == len));
    entries.insert("length".to_string(), Value::Int(len as i64));
    let previtem = index.checked_sub(1).and_then(|i| items.get(i)).cloned();
    entries.insert("previtem".to_string(), previtem.unwrap_or_default());
    entries.insert(
        "nextitem".to_string(),
        items.get(index + 1).cloned().unwrap_or_default(),
    );
    Value::object(entries)
}

fn exec_for(stmt: &ForStmt, ctx: &mut Context, out: &mut JinjaString) -> Exec<()> {
    let (iterable, filter) = match &stmt.iterable.kind {
        ExprKind::Select { value, test } => (value.as_ref(), Some(test.as_ref())),
        _ => (&stmt.iterable, None),
    };
    let pairs = matches!(stmt.target.kind, ExprKind::Tuple(_));
    let mut items = iteration_items(eval(iterable, ctx)?, pairs, ctx)?;

    if let Some(test) = filter {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let mut scope = ctx.child();
            bind_target(&stmt.target, item.clone(), &mut scope)?;
            if eval(test, &scope)?.is_truthy() {
                kept.push(item);
            }
        }
        items = kept;
    }

    tracing::trace!(items = items.len(), "for loop");

    if items.is_empty() {
        return exec_block(&stmt.else_body, ctx, out);
    }

    for (index, item) in items.iter().enumerate() {
        let mut scope = ctx.child();
        bind_target(&stmt.target, item.clone(), &mut scope)?;
        scope.set("loop", loop_object(index, &items));
        match exec_block(&stmt.body, &mut scope, out) {
            Ok(()) | Err(Unwind::Continue(_)) => {}
            Err(Unwind::Break(_)) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

// ============================================================================
// Assignment, macros and blocks
// ============================================================================

fn exec_set(stmt: &SetStmt, ctx: &mut Context) -> JinjaResult<()> {
    let value = match &stmt.value {
        Some(expr) => eval(expr, ctx)?,
        None => Value::String(render_body(&stmt.body, &mut ctx.child())?),
    };
    match &stmt.target.kind {
        ExprKind::Member {
            object, property, ..
        } => {
            let name = property.as_identifier().ok_or_else(|| {
                JinjaError::type_error("assignment target must name an attribute")
            })?;
            match eval(object, ctx)? {
                Value::Object(o) => {
                    o.insert(name, value);
                    Ok(())
                }
                other => Err(JinjaError::type_error(format!(
                    "cannot set attribute '{}' on a value of type {}",
                    name,
                    other.type_name()
                ))),
            }
        }
        _ => bind_target(&stmt.target, value, ctx),
    }
}

/// Invoke a macro (or a call block's `caller`) with evaluated arguments.
fn call_macro(
    def: &MacroDef,
    scope: &Context,
    positional: Vec<Value>,
    mut kwargs: IndexMap<String, Value>,
    caller: Option<Value>,
) -> JinjaResult<Value> {
    tracing::trace!(name = %def.name, args = positional.len(), "calling macro");
    let mut local = scope.child();
    let bound = positional.len().min(def.params.len());
    let mut extra = Vec::new();
    for (index, value) in positional.into_iter().enumerate() {
        match def.params.get(index) {
            Some(param) => local.set(param.name.clone(), value),
            None => extra.push(value),
        }
    }
    for param in &def.params[bound..] {
        let value = match (kwargs.shift_remove(&param.name), &param.default) {
            (Some(value), _) => value,
            (None, Some(default)) => eval(default, &local)?,
            (None, None) => Value::Undefined,
        };
        local.set(param.name.clone(), value);
    }
    local.set("varargs", Value::array(extra));
    local.set("kwargs", Value::object(kwargs));
    if let Some(caller) = caller {
        local.set("caller", caller);
    }
    let out = render_body(&def.body, &mut local)?;
    if out.parts().is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::String(out))
}

fn exec_call_block(stmt: &CallStmt, ctx: &Context) -> JinjaResult<Value> {
    let caller = Value::Function(Function::macro_closure(
        Rc::clone(&stmt.caller),
        ctx.clone(),
    ));
    match &stmt.call.kind {
        ExprKind::Call { callee, args } => eval_call(callee, args, ctx, Some(caller))
            .map_err(|e| e.at_node(stmt.call.node_name(), stmt.call.offset)),
        _ => Err(JinjaError::type_error("call block requires a call expression")),
    }
}

fn exec_filter_block(stmt: &FilterStmt, ctx: &Context) -> JinjaResult<Value> {
    let body = render_body(&stmt.body, &mut ctx.child())?;
    apply_filter_call(&stmt.filter, Value::String(body), ctx)
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate `expr`, attributing failures to the innermost failing node.
pub(crate) fn eval(expr: &Expr, ctx: &Context) -> JinjaResult<Value> {
    eval_kind(expr, ctx).map_err(|e| e.at_node(expr.node_name(), expr.offset))
}

fn eval_kind(expr: &Expr, ctx: &Context) -> JinjaResult<Value> {
    match &expr.kind {
        ExprKind::Int(i) => Ok(Value::Int(*i)),
        ExprKind::Float(f) => Ok(Value::Float(*f)),
        ExprKind::Str(s) => Ok(Value::string(s.as_str())),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::None => Ok(Value::None),
        ExprKind::Array(items) | ExprKind::Tuple(items) => Ok(Value::array(
            items
                .iter()
                .map(|item| eval(item, ctx))
                .collect::<JinjaResult<Vec<_>>>()?,
        )),
        ExprKind::Object(entries) => {
            let mut map = IndexMap::new();
            for (key, value) in entries {
                let key = object_key(eval(key, ctx)?)?;
                map.insert(key, eval(value, ctx)?);
            }
            Ok(Value::object(map))
        }
        ExprKind::Identifier(name) => Ok(resolve_identifier(name, ctx)),
        ExprKind::Member {
            object,
            property,
            computed,
        } => eval_member(object, property, *computed, ctx),
        ExprKind::Call { callee, args } => eval_call(callee, args, ctx, None),
        ExprKind::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        ExprKind::Unary { op, operand } => eval_unary(*op, eval(operand, ctx)?),
        ExprKind::Filter { operand, filter } => {
            let value = eval(operand, ctx)?;
            apply_filter_call(filter, value, ctx)
        }
        ExprKind::Test {
            operand,
            negate,
            name,
            args,
        } => {
            let value = eval(operand, ctx)?;
            let (positional, kwargs) = eval_args(args, ctx)?;
            if let Some(key) = kwargs.keys().next() {
                return Err(JinjaError::type_error(format!(
                    "test '{}' takes positional arguments only, got keyword '{}'",
                    name, key
                )));
            }
            let passed = apply_test(ctx, name, value, &positional)?;
            Ok(Value::Bool(passed != *negate))
        }
        ExprKind::Select { value, test } => {
            if eval(test, ctx)?.is_truthy() {
                eval(value, ctx)
            } else {
                Ok(Value::Undefined)
            }
        }
        ExprKind::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if eval(condition, ctx)?.is_truthy() {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
        ExprKind::Slice { .. } => Err(JinjaError::type_error(
            "slice is only valid inside a subscript",
        )),
        ExprKind::KeywordArg { key, .. } => Err(JinjaError::type_error(format!(
            "keyword argument '{}' outside of a call",
            key
        ))),
        ExprKind::Spread(_) => Err(JinjaError::type_error(
            "spread argument outside of a call",
        )),
    }
}

fn object_key(key: Value) -> JinjaResult<String> {
    match key {
        Value::String(s) => Ok(s.to_string()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None => Ok(key.to_string()),
        other => Err(JinjaError::type_error(format!(
            "object keys must be strings, got {}",
            other.type_name()
        ))),
    }
}

/// Scope, then global builtins, then Undefined.
fn resolve_identifier(name: &str, ctx: &Context) -> Value {
    if let Some(value) = ctx.get(name) {
        return value;
    }
    match lookup_global(name) {
        Some((name, func)) => Value::Function(Function::builtin(name, func)),
        None => Value::Undefined,
    }
}

fn bound_member(value: &Value, name: &str, ctx: &Context) -> Option<Value> {
    lookup_member(value, name, ctx.workarounds())
        .map(|(name, func)| Value::Function(Function::builtin(name, func).bind(value.clone())))
}

/// `object.name`
fn get_attribute(object: &Value, name: &str, ctx: &Context) -> JinjaResult<Value> {
    if let Value::Object(o) = object {
        if let Some(value) = o.get(name) {
            return Ok(value);
        }
    }
    if let Some(method) = bound_member(object, name, ctx) {
        return Ok(method);
    }
    match object {
        Value::Undefined | Value::None => Err(JinjaError::type_error(format!(
            "cannot access attribute '{}' of {}",
            name,
            object.type_name()
        ))),
        _ => Ok(Value::Undefined),
    }
}

/// Resolve a possibly negative index against a length.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

/// `object[key]`
fn get_item(object: &Value, key: &Value, ctx: &Context) -> JinjaResult<Value> {
    match (object, key) {
        (Value::Array(a), Value::Int(i)) => {
            Ok(resolve_index(*i, a.len()).and_then(|i| a.get(i)).unwrap_or_default())
        }
        (Value::String(s), Value::Int(i)) => {
            let chars = s.chars();
            Ok(resolve_index(*i, chars.len())
                .and_then(|i| chars.into_iter().nth(i))
                .map(Value::String)
                .unwrap_or_default())
        }
        (Value::Object(o), key) => match o.get(&object_key(key.clone())?) {
            Some(value) => Ok(value),
            None => match key {
                Value::String(name) => get_attribute(object, &name.as_str(), ctx),
                _ => Ok(Value::Undefined),
            },
        },
        (Value::Undefined | Value::None, _) => Err(JinjaError::type_error(format!(
            "cannot index into {}",
            object.type_name()
        ))),
        (_, Value::String(name)) => get_attribute(object, &name.as_str(), ctx),
        _ => Ok(Value::Undefined),
    }
}

fn optional_int(expr: Option<&Expr>, ctx: &Context) -> JinjaResult<Option<i64>> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    match eval(expr, ctx)? {
        Value::Undefined | Value::None => Ok(None),
        Value::Int(i) => Ok(Some(i)),
        other => Err(JinjaError::type_error(format!(
            "slice indices must be integers, got {}",
            other.type_name()
        ))),
    }
}

fn eval_member(object: &Expr, property: &Expr, computed: bool, ctx: &Context) -> JinjaResult<Value> {
    let target = eval(object, ctx)?;
    if !computed {
        let name = property
            .as_identifier()
            .ok_or_else(|| JinjaError::type_error("attribute name must be an identifier"))?;
        return get_attribute(&target, name, ctx);
    }

    if target.is_input_string() {
        ctx.record_input_op(OP_ARRAY_ACCESS);
    }
    if let ExprKind::Slice { start, stop, step } = &property.kind {
        let start = optional_int(start.as_deref(), ctx)?;
        let stop = optional_int(stop.as_deref(), ctx)?;
        let step = optional_int(step.as_deref(), ctx)?;
        return slice_value(&target, start, stop, step);
    }
    let key = eval(property, ctx)?;
    get_item(&target, &key, ctx)
}

// ============================================================================
// Calls and filters
// ============================================================================

/// Evaluate call arguments left to right into positional and keyword lists.
fn eval_args(args: &[Expr], ctx: &Context) -> JinjaResult<(Vec<Value>, IndexMap<String, Value>)> {
    let mut positional = Vec::new();
    let mut kwargs = IndexMap::new();
    for arg in args {
        match &arg.kind {
            ExprKind::KeywordArg { key, value } => {
                kwargs.insert(key.clone(), eval(value, ctx)?);
            }
            ExprKind::Spread(inner) => match eval(inner, ctx)? {
                Value::Array(items) => positional.extend(items.to_vec()),
                other => {
                    return Err(JinjaError::type_error(format!(
                        "cannot spread a value of type {}",
                        other.type_name()
                    ))
                    .at_node(arg.node_name(), arg.offset))
                }
            },
            _ => positional.push(eval(arg, ctx)?),
        }
    }
    Ok((positional, kwargs))
}

fn eval_call(callee: &Expr, args: &[Expr], ctx: &Context, caller: Option<Value>) -> JinjaResult<Value> {
    let func = eval(callee, ctx)?;
    let (positional, kwargs) = eval_args(args, ctx)?;
    call_value(&func, positional, kwargs, ctx, caller)
}

/// Call a function value. Bound receivers are passed as the first argument.
pub(crate) fn call_value(
    func: &Value,
    positional: Vec<Value>,
    kwargs: IndexMap<String, Value>,
    ctx: &Context,
    caller: Option<Value>,
) -> JinjaResult<Value> {
    let Value::Function(func) = func else {
        return Err(JinjaError::type_error(format!(
            "value of type {} is not callable",
            func.type_name()
        )));
    };
    match func.kind() {
        FunctionKind::Builtin { name, func: builtin } => {
            let mut args = Vec::with_capacity(positional.len() + 1);
            if let Some(receiver) = func.receiver() {
                args.push(receiver.clone());
            }
            args.extend(positional);
            builtin(&FuncArgs::new(name, args, ctx).with_kwargs(kwargs))
        }
        FunctionKind::Macro { def, scope } => call_macro(def, scope, positional, kwargs, caller),
    }
}

fn apply_filter_call(filter: &FilterCall, value: Value, ctx: &Context) -> JinjaResult<Value> {
    if value.is_input_string() && matches!(filter.name.as_str(), "selectattr" | "rejectattr") {
        ctx.record_input_op(OP_SELECTATTR);
    }
    let (positional, kwargs) = eval_args(&filter.args, ctx)?;
    let (name, func) = lookup_filter(&value, &filter.name, ctx.workarounds()).ok_or_else(|| {
        JinjaError::type_error(format!(
            "unknown filter '{}' for type {}",
            filter.name,
            value.type_name()
        ))
    })?;
    let mut args = Vec::with_capacity(positional.len() + 1);
    args.push(value);
    args.extend(positional);
    func(&FuncArgs::new(name, args, ctx).with_kwargs(kwargs))
}

// ============================================================================
// Operators
// ============================================================================

fn unsupported(op: &str, left: &Value, right: &Value) -> JinjaError {
    JinjaError::type_error(format!(
        "unsupported operand types for {}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &Context) -> JinjaResult<Value> {
    let l = eval(left, ctx)?;
    match op {
        BinaryOp::Or if l.is_truthy() => return Ok(l),
        BinaryOp::And if !l.is_truthy() => return Ok(l),
        BinaryOp::Or | BinaryOp::And => return eval(right, ctx),
        _ => {}
    }
    let r = eval(right, ctx)?;
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(value_eq(&l, &r))),
        BinaryOp::Ne => return Ok(Value::Bool(!value_eq(&l, &r))),
        BinaryOp::Concat => return Ok(Value::String(l.to_display().concat(&r.to_display()))),
        BinaryOp::In => return Ok(Value::Bool(contains(&r, &l)?)),
        BinaryOp::NotIn => return Ok(Value::Bool(!contains(&r, &l)?)),
        _ => {}
    }

    if op == BinaryOp::Add && ctx.workarounds().string_plus_undefined_is_string {
        match (&l, &r) {
            (Value::String(_), Value::Undefined) => return Ok(l),
            (Value::Undefined, Value::String(_)) => return Ok(r),
            _ => {}
        }
    }
    let is_missing = |v: &Value| v.is_undefined() || v.is_none();
    if is_missing(&l) || is_missing(&r) {
        return Err(unsupported(op.as_str(), &l, &r));
    }

    match op {
        BinaryOp::Lt => Ok(Value::Bool(value_cmp(&l, &r)?.is_lt())),
        BinaryOp::Gt => Ok(Value::Bool(value_cmp(&l, &r)?.is_gt())),
        BinaryOp::Le => Ok(Value::Bool(value_cmp(&l, &r)?.is_le())),
        BinaryOp::Ge => Ok(Value::Bool(value_cmp(&l, &r)?.is_ge())),
        _ => arithmetic(op, l, r),
    }
}

/// Python floor division on integers.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Python modulo on integers: the result takes the divisor's sign.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn repeat(value: &Value, times: i64) -> Option<Value> {
    let n = times.max(0) as usize;
    match value {
        Value::String(s) => Some(Value::String(s.repeat(n))),
        Value::Array(a) => {
            let items = a.to_vec();
            let mut out = Vec::with_capacity(items.len() * n);
            for _ in 0..n {
                out.extend(items.iter().cloned());
            }
            Some(Value::array(out))
        }
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> JinjaResult<Value> {
    let zero_divisor = matches!(r, Value::Int(0)) || matches!(r, Value::Float(f) if f == 0.0);
    match (op, &l, &r) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a.concat(b))),
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            let mut items = a.to_vec();
            items.extend(b.to_vec());
            Ok(Value::array(items))
        }
        (BinaryOp::Mul, seq, Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), seq)
            if matches!(seq, Value::String(_) | Value::Array(_)) =>
        {
            repeat(seq, *n).ok_or_else(|| unsupported(op.as_str(), &l, &r))
        }
        (BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod, a, b)
            if a.is_numeric() && b.is_numeric() && zero_divisor =>
        {
            Err(JinjaError::type_error(format!(
                "division by zero in '{}'",
                op.as_str()
            )))
        }
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            Ok(match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div => Value::Float(a as f64 / b as f64),
                BinaryOp::FloorDiv => Value::Int(floor_div(a, b)),
                BinaryOp::Mod => Value::Int(floor_mod(a, b)),
                _ => return Err(unsupported(op.as_str(), &l, &r)),
            })
        }
        (_, a, b) if a.is_numeric() && b.is_numeric() => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::FloorDiv => (a / b).floor(),
                BinaryOp::Mod => float_mod(a, b),
                _ => return Err(unsupported(op.as_str(), &l, &r)),
            }))
        }
        _ => Err(unsupported(op.as_str(), &l, &r)),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> JinjaResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, v) if v.is_numeric() => Ok(v),
        (op, v) => Err(JinjaError::type_error(format!(
            "bad operand type for unary {}: {}",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexerOptions;
    use crate::error::ErrorKind;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(source: &str, ctx: &Context) -> JinjaResult<JinjaString> {
        let lexed = tokenize(source, &LexerOptions::default())?;
        let program = parse(&lexed.tokens)?;
        execute(&program, ctx)
    }

    fn render(source: &str) -> String {
        render_with(source, json!({}))
    }

    fn render_with(source: &str, data: serde_json::Value) -> String {
        let ctx = Context::from_json(&data).unwrap();
        run(source, &ctx).unwrap().to_string()
    }

    fn render_err(source: &str) -> JinjaError {
        run(source, &Context::new()).unwrap_err()
    }

    // ========================================================================
    // Output and conditionals
    // ========================================================================

    #[test]
    fn test_output_display_forms() {
        assert_eq!(render("{{ 1 }} {{ 1.0 }} {{ true }} {{ none }} [{{ missing }}]"), "1 1.0 True None []");
        assert_eq!(render("{{ [1, 'a'] }} {{ {'k': none} }}"), "[1, 'a'] {'k': None}");
    }

    #[test]
    fn test_if_elif_else() {
        let t = "{% if x > 1 %}big{% elif x == 1 %}one{% else %}small{% endif %}";
        assert_eq!(render_with(t, json!({"x": 5})), "big");
        assert_eq!(render_with(t, json!({"x": 1})), "one");
        assert_eq!(render_with(t, json!({"x": 0})), "small");
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(render("{{ 0 or 'x' }}|{{ 'a' and 'b' }}|{{ not 0 }}"), "x|b|True");
        assert_eq!(render("{{ '' or missing }}"), "");
    }

    #[test]
    fn test_select_and_ternary() {
        assert_eq!(render("[{{ 'y' if false }}]{{ 'a' if true else 'b' }}"), "[]a");
    }

    // ========================================================================
    // Loops
    // ========================================================================

    #[test]
    fn test_loop_metadata() {
        let out = render("{% for x in ['a', 'b', 'c'] %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}");
        assert_eq!(out, "1a,2b,3c");
        let out = render("{% for x in [1, 2, 3] %}{{ loop.revindex0 }}{{ loop.previtem }}{{ loop.nextitem }};{% endfor %}");
        assert_eq!(out, "22;113;02;");
    }

    #[test]
    fn test_loop_filter_applies_before_metadata() {
        let out = render("{% for x in [1, 2, 3, 4, 5] if x is odd %}{{ x }}/{{ loop.length }} {% endfor %}");
        assert_eq!(out, "1/3 3/3 5/3 ");
    }

    #[test]
    fn test_loop_else_and_undefined_iterable() {
        assert_eq!(render("{% for x in [] %}x{% else %}empty{% endfor %}"), "empty");
        assert_eq!(render("{% for x in missing %}x{% else %}none{% endfor %}"), "none");
        assert_eq!(render("{% for x in [1] if x > 5 %}x{% else %}filtered{% endfor %}"), "filtered");
    }

    #[test]
    fn test_loop_over_objects_and_strings() {
        let data = json!({"d": {"b": 1, "a": 2}});
        assert_eq!(render_with("{% for k in d %}{{ k }}{% endfor %}", data.clone()), "ba");
        assert_eq!(render_with("{% for k, v in d %}{{ k }}={{ v }};{% endfor %}", data), "b=1;a=2;");
        assert_eq!(render("{% for c in 'abc' %}{{ c }}.{% endfor %}"), "a.b.c.");
        assert!(render_err("{% for x in 5 %}{% endfor %}").to_string().contains("cannot iterate"));
    }

    #[test]
    fn test_break_and_continue() {
        let out = render("{% for x in range(10) %}{% if x == 1 %}{% continue %}{% endif %}{% if x == 4 %}{% break %}{% endif %}{{ x }}{% endfor %}");
        assert_eq!(out, "023");
        let err = render_err("{% break %}");
        assert!(err.to_string().contains("outside of a loop"));
    }

    #[test]
    fn test_loop_scope_does_not_leak() {
        assert_eq!(render("{% set x = 1 %}{% for i in [1, 2] %}{% set x = i %}{% endfor %}{{ x }}"), "1");
    }

    #[test]
    fn test_execute_keeps_assignments_out_of_caller_scope() {
        let mut ctx = Context::new();
        ctx.set("x", Value::Int(1));
        assert_eq!(run("{% set x = 2 %}{% set y = 3 %}{{ x }}", &ctx).unwrap().to_string(), "2");
        assert_eq!(ctx.get("x"), Some(Value::Int(1)));
        assert_eq!(ctx.get("y"), None);
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    #[test]
    fn test_namespace_counter() {
        let out = render("{% set ns = namespace(n=0) %}{% for i in [1, 2, 3] %}{% set ns.n = ns.n + i %}{% endfor %}{{ ns.n }}");
        assert_eq!(out, "6");
    }

    #[test]
    fn test_set_forms() {
        assert_eq!(render("{% set a, b = 1, 2 %}{{ b }}{{ a }}"), "21");
        assert_eq!(render("{% set x %}hi {{ 1 + 1 }}{% endset %}[{{ x }}]"), "[hi 2]");
        assert!(render_err("{% set a, b = [1] %}").to_string().contains("unpack"));
    }

    #[test]
    fn test_aliasing_through_assignment() {
        assert_eq!(render("{% set a = [1] %}{% set b = a %}{% set _ = b.append(2) %}{{ a }}"), "[1, 2]");
        assert_eq!(render("{% set a = [1] %}{% set b = a + [] %}{% set _ = b.append(2) %}{{ a }}"), "[1]");
    }

    // ========================================================================
    // Macros and blocks
    // ========================================================================

    #[test]
    fn test_macro_defaults_and_kwargs() {
        let t = "{% macro greet(name, greeting='Hello') %}{{ greeting }}, {{ name }}!{% endmacro %}";
        assert_eq!(render(&format!("{t}{{{{ greet('Ann') }}}}")), "Hello, Ann!");
        assert_eq!(render(&format!("{t}{{{{ greet('Bo', greeting='Hi') }}}}")), "Hi, Bo!");
        assert_eq!(render(&format!("{t}{{{{ greet(greeting='Yo', name='Cy') }}}}")), "Yo, Cy!");
    }

    #[test]
    fn test_macro_sees_later_definitions_and_recursion() {
        let t = "{% macro count(n) %}{% if n > 0 %}{{ n }}{{ count(n - 1) }}{% endif %}{% endmacro %}{{ count(3) }}";
        assert_eq!(render(t), "321");
    }

    #[test]
    fn test_call_block_binds_caller() {
        let t = "{% macro wrap(tag) %}<{{ tag }}>{{ caller() }}</{{ tag }}>{% endmacro %}{% call wrap('b') %}text{% endcall %}";
        assert_eq!(render(t), "<b>text</b>");
        let t = "{% macro each(xs) %}{% for x in xs %}{{ caller(x) }}{% endfor %}{% endmacro %}{% call(item) each([1, 2]) %}[{{ item }}]{% endcall %}";
        assert_eq!(render(t), "[1][2]");
    }

    #[test]
    fn test_filter_block() {
        assert_eq!(render("{% filter upper %}abc {{ 'd' }}{% endfilter %}"), "ABC D");
    }

    // ========================================================================
    // Member access and calls
    // ========================================================================

    #[test]
    fn test_member_access() {
        let data = json!({"m": {"role": "user", "items": [1, 2, 3]}, "s": "hello"});
        assert_eq!(render_with("{{ m.role }}{{ m['role'] }}{{ m.items[-1] }}", data.clone()), "useruser3");
        assert_eq!(render_with("[{{ m.items[10] }}][{{ m.nope }}]", data.clone()), "[][]");
        assert_eq!(render_with("{{ s[1:-1] }} {{ s[::-1] }} {{ s[0] }}", data.clone()), "ell olleh h");
        assert_eq!(render_with("{{ m.items[1:] }}", data), "[2, 3]");
    }

    #[test]
    fn test_member_access_on_undefined_fails() {
        let err = render_err("{{ missing.attr }}");
        assert_eq!(err.kind(), ErrorKind::Type);
        assert!(err.to_string().starts_with("MemberExpression at byte 3"));
    }

    #[test]
    fn test_object_keys_shadow_builtins() {
        let data = json!({"m": {"items": "mine"}});
        assert_eq!(render_with("{{ m.items }}", data.clone()), "mine");
        assert_eq!(render_with("{{ m.keys() }}", data), "['items']");
    }

    #[test]
    fn test_calling_non_function_names_type() {
        let err = render_err("{{ 'x'() }}");
        assert!(err.to_string().contains("string is not callable"));
    }

    #[test]
    fn test_spread_arguments() {
        assert_eq!(render("{{ range(*[1, 4]) }}"), "[1, 2, 3]");
    }

    // ========================================================================
    // Operators
    // ========================================================================

    #[test]
    fn test_arithmetic() {
        assert_eq!(render("{{ 1 + 2 }} {{ 1 + 2.0 }} {{ 7 / 2 }} {{ 7 // 2 }} {{ -7 // 2 }} {{ -7 % 3 }} {{ 7.5 % 2 }}"), "3 3.0 3.5 3 -4 2 1.5");
        assert_eq!(render("{{ 'ab' * 2 }}{{ [0] * 2 }}"), "abab[0, 0]");
        assert_eq!(render("{{ [1] + [2] }}"), "[1, 2]");
        assert_eq!(render_with("{{ -1.5 }} {{ x * -0.5 }} {{ -x | abs }}", json!({"x": 4})), "-1.5 -2.0 4");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(render_err("{{ 1 / 0 }}").kind(), ErrorKind::Type);
        assert_eq!(render_err("{{ 1 % 0 }}").kind(), ErrorKind::Type);
    }

    #[test]
    fn test_concat_never_fails() {
        assert_eq!(render("{{ 'a' ~ 1 ~ none ~ missing ~ [2] }}"), "a1None[2]");
    }

    #[test]
    fn test_plus_type_rules() {
        assert!(render_err("{{ 'a' + 1 }}").to_string().contains("unsupported operand types for +"));
        assert_eq!(render("{{ 'a' + missing }}"), "a");
        assert!(render_err("{{ 1 + missing }}").to_string().contains("undefined"));
        assert!(render_err("{{ none - 1 }}").to_string().contains("none"));
    }

    #[test]
    fn test_membership() {
        assert_eq!(render("{{ 1 in [1, 2] }} {{ 'a' in 'cat' }} {{ 'k' in {'k': 1} }}"), "True True True");
        assert_eq!(render("{{ 1 in missing }} {{ 1 not in missing }}"), "False True");
    }

    #[test]
    fn test_equality_and_ordering() {
        assert_eq!(render("{{ 1 == 1.0 }} {{ none == none }} {{ [1] == [1] }} {{ 'a' != 'b' }}"), "True True True True");
        assert_eq!(render("{{ 'b' > 'a' }} {{ 2 >= 2 }}"), "True True");
        assert_eq!(render_err("{{ [1] < 1 }}").kind(), ErrorKind::Type);
    }

    #[test]
    fn test_tests_and_negation() {
        assert_eq!(render("{{ x is defined }} {{ x is not defined }} {{ 3 is divisibleby(3) }}"), "False True True");
    }

    #[test]
    fn test_keyword_arguments_to_tests_are_rejected() {
        let err = render_err("{{ 3 is divisibleby(num=3) }}");
        assert_eq!(err.kind(), ErrorKind::Type);
        assert!(err.to_string().contains("positional arguments only"), "{}", err);
    }

    // ========================================================================
    // Provenance and input operations
    // ========================================================================

    #[test]
    fn test_output_keeps_input_parts() {
        let mut ctx = Context::new();
        ctx.set_json_input("user", &json!("hi"));
        let out = run("<{{ user }}>", &ctx).unwrap();
        let flags: Vec<(bool, String)> = out
            .parts()
            .iter()
            .map(|p| (p.is_input, p.text.clone()))
            .collect();
        assert_eq!(
            flags,
            vec![
                (false, "<".to_string()),
                (true, "hi".to_string()),
                (false, ">".to_string())
            ]
        );
    }

    #[test]
    fn test_records_array_operations_on_input_strings() {
        let mut ctx = Context::new();
        ctx.set_json_input("content", &json!("hello"));
        run("{{ content[0] }}{% for c in content %}{% endfor %}", &ctx).unwrap();
        assert_eq!(ctx.input_ops(), vec![OP_ARRAY_ACCESS, OP_ITERATE]);

        let _ = run("{{ content | selectattr('type') }}", &ctx);
        assert!(ctx.input_ops().contains(&OP_SELECTATTR));
    }

    #[test]
    fn test_template_strings_do_not_record() {
        let ctx = Context::new();
        run("{{ 'abc'[0] }}{% for c in 'ab' %}{% endfor %}", &ctx).unwrap();
        assert!(ctx.input_ops().is_empty());
    }
}
