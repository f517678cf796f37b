/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! The tree is built once by the parser and is read-only while rendering.
//! Every node records the byte offset of its first token in the
//! preprocessed source for error reporting. Macro and `caller` bodies are
//! held behind `Rc` so closures can refer to them without copying.

use std::rc::Rc;

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Literal template text outside of tags.
    Text(Text),

    /// Expression output: `{{ expr }}`
    Output(Expr),

    /// `{# ... #}`
    Comment(Comment),

    /// `{% if %}...{% elif %}...{% else %}...{% endif %}`
    If(IfStmt),

    /// `{% for x in xs [if test] %}...{% else %}...{% endfor %}`
    For(ForStmt),

    /// `{% set x = expr %}` or `{% set x %}...{% endset %}`
    Set(SetStmt),

    /// `{% macro name(params) %}...{% endmacro %}`
    Macro(Rc<MacroDef>),

    /// `{% call[(params)] expr %}...{% endcall %}`
    Call(CallStmt),

    /// `{% filter name[(args)] %}...{% endfilter %}`
    Filter(FilterStmt),

    /// `{% break %}`
    Break(usize),

    /// `{% continue %}`
    Continue(usize),
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
    pub offset: usize,
}

/// Comment node. Renders nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub offset: usize,
}

/// Conditional. `elif` chains are nested `IfStmt`s in `else_body`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
    pub offset: usize,
}

/// For loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    /// Identifier or tuple of identifiers.
    pub target: Expr,
    /// The iterable. A trailing `if` makes this a [`ExprKind::Select`],
    /// whose test filters the items before loop metadata is computed.
    pub iterable: Expr,
    pub body: Vec<Stmt>,
    /// Runs when no item survives filtering.
    pub else_body: Vec<Stmt>,
    pub offset: usize,
}

/// Assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    /// Identifier, tuple of identifiers, or `ns.attr` member expression.
    pub target: Expr,
    /// `None` for the block form, whose rendered body is assigned instead.
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
    pub offset: usize,
}

/// A macro parameter with an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Expr>,
}

/// Macro definition. Also used for the body of a call block, named `caller`.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Stmt>,
    pub offset: usize,
}

/// Call block: invokes `call` with the body bound as `caller`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStmt {
    pub call: Expr,
    pub caller: Rc<MacroDef>,
    pub offset: usize,
}

/// Filter block: the rendered body is piped through `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStmt {
    pub filter: FilterCall,
    pub body: Vec<Stmt>,
    pub offset: usize,
}

/// A filter application: `name` or `name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

/// An expression with its source offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
}

/// Binary operators, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    /// `~`
    Concat,
    Mul,
    Div,
    /// `//`
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "or" => BinaryOp::Or,
            "and" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "in" => BinaryOp::In,
            "not in" => BinaryOp::NotIn,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "~" => BinaryOp::Concat,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Mod,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Concat => "~",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// `true`/`false`, in either case.
    Bool(bool),
    /// `none`, in either case.
    None,
    Array(Vec<Expr>),
    Tuple(Vec<Expr>),
    Object(Vec<(Expr, Expr)>),
    Identifier(String),

    /// `object.property` or `object[property]`.
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `operand | name(args)`
    Filter {
        operand: Box<Expr>,
        filter: FilterCall,
    },

    /// `operand is [not] name(args)`
    Test {
        operand: Box<Expr>,
        negate: bool,
        name: String,
        args: Vec<Expr>,
    },

    /// `value if test` without `else`: the value, or Undefined.
    Select {
        value: Box<Expr>,
        test: Box<Expr>,
    },

    /// `then if condition else otherwise`
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// `[start:stop:step]` inside a computed member access.
    Slice {
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },

    /// `key=value` inside a call's argument list.
    KeywordArg {
        key: String,
        value: Box<Expr>,
    },

    /// `*value` inside a call's argument list.
    Spread(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    /// Node kind reported in runtime errors.
    pub fn node_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Int(_) => "IntegerLiteral",
            ExprKind::Float(_) => "FloatLiteral",
            ExprKind::Str(_) => "StringLiteral",
            ExprKind::Bool(_) => "BooleanLiteral",
            ExprKind::None => "NoneLiteral",
            ExprKind::Array(_) => "ArrayLiteral",
            ExprKind::Tuple(_) => "TupleLiteral",
            ExprKind::Object(_) => "ObjectLiteral",
            ExprKind::Identifier(_) => "Identifier",
            ExprKind::Member { .. } => "MemberExpression",
            ExprKind::Call { .. } => "CallExpression",
            ExprKind::Binary { .. } => "BinaryExpression",
            ExprKind::Unary { .. } => "UnaryExpression",
            ExprKind::Filter { .. } => "FilterExpression",
            ExprKind::Test { .. } => "TestExpression",
            ExprKind::Select { .. } => "SelectExpression",
            ExprKind::Ternary { .. } => "TernaryExpression",
            ExprKind::Slice { .. } => "SliceExpression",
            ExprKind::KeywordArg { .. } => "KeywordArgumentExpression",
            ExprKind::Spread(_) => "SpreadExpression",
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl Stmt {
    /// Node kind reported in runtime errors.
    pub fn node_name(&self) -> &'static str {
        match self {
            Stmt::Text(_) => "Text",
            Stmt::Output(expr) => expr.node_name(),
            Stmt::Comment(_) => "Comment",
            Stmt::If(_) => "IfStatement",
            Stmt::For(_) => "ForStatement",
            Stmt::Set(_) => "SetStatement",
            Stmt::Macro(_) => "MacroStatement",
            Stmt::Call(_) => "CallStatement",
            Stmt::Filter(_) => "FilterStatement",
            Stmt::Break(_) => "BreakStatement",
            Stmt::Continue(_) => "ContinueStatement",
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Stmt::Text(t) => t.offset,
            Stmt::Output(e) => e.offset,
            Stmt::Comment(c) => c.offset,
            Stmt::If(s) => s.offset,
            Stmt::For(s) => s.offset,
            Stmt::Set(s) => s.offset,
            Stmt::Macro(m) => m.offset,
            Stmt::Call(s) => s.offset,
            Stmt::Filter(s) => s.offset,
            Stmt::Break(offset) | Stmt::Continue(offset) => *offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_token_round_trip() {
        for op in ["or", "and", "==", "!=", "<", ">", "<=", ">=", "in", "not in", "+", "-", "~", "*", "/", "//", "%"] {
            let parsed = BinaryOp::from_token(op).unwrap();
            assert_eq!(parsed.as_str(), op);
        }
        assert_eq!(BinaryOp::from_token("**"), None);
    }

    #[test]
    fn test_node_names_and_offsets() {
        let expr = Expr::new(ExprKind::Identifier("x".to_string()), 7);
        assert_eq!(expr.node_name(), "Identifier");
        assert_eq!(expr.as_identifier(), Some("x"));

        let stmt = Stmt::Output(expr);
        assert_eq!(stmt.node_name(), "Identifier");
        assert_eq!(stmt.offset(), 7);
        assert_eq!(Stmt::Break(3).node_name(), "BreakStatement");
    }
}
