/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Recursive-descent parser from tokens to the template AST.
//!
//! Expression precedence, lowest to highest:
//!
//! ```text
//! ternary / select   a if b else c, a if b
//! or
//! and
//! not
//! comparison         == != < > <= >= in, not in
//! additive           + - ~
//! multiplicative     * / // %
//! unary sign         -x +x
//! test               x is [not] name(args)
//! filter             x | name(args)
//! member / call      x.y x[i] x[a:b:c] f(args)
//! primary
//! ```
//!
//! Parsing is all-or-nothing: the first mismatch aborts with a parse error
//! pointing at the offending token.

use crate::ast::{
    BinaryOp, CallStmt, Comment, Expr, ExprKind, FilterCall, FilterStmt, ForStmt, IfStmt,
    MacroDef, MacroParam, Program, SetStmt, Stmt, Text, UnaryOp,
};
use crate::error::{JinjaError, JinjaResult};
use crate::lexer::{Token, TokenKind};
use std::rc::Rc;

/// Parse a token stream into a program.
pub fn parse(tokens: &[Token]) -> JinjaResult<Program> {
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.parse_any()?);
    }
    Ok(Program { body })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn is(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// Offset of the current token, or the end of the last one.
    fn offset(&self) -> usize {
        match self.peek() {
            Some(t) => t.offset,
            None => self
                .tokens
                .last()
                .map(|t| t.offset + t.value.len())
                .unwrap_or(0),
        }
    }

    fn unexpected(&self, expected: &str) -> JinjaError {
        match self.peek() {
            Some(t) => JinjaError::parse(
                format!("expected {}, found '{}'", expected, t.value),
                t.offset,
            ),
            None => JinjaError::parse(
                format!("expected {}, found end of template", expected),
                self.offset(),
            ),
        }
    }

    fn advance(&mut self) -> JinjaResult<&'a Token> {
        match self.tokens.get(self.pos) {
            Some(t) => {
                self.pos += 1;
                Ok(t)
            }
            None => Err(self.unexpected("more input")),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> JinjaResult<&'a Token> {
        if self.is(kind) {
            self.advance()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self) -> JinjaResult<&'a Token> {
        self.expect(TokenKind::Identifier, "identifier")
    }

    fn is_keyword(&self, name: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Identifier && t.value == name)
    }

    fn expect_keyword(&mut self, name: &str) -> JinjaResult<()> {
        if self.is_keyword(name) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", name)))
        }
    }

    /// True if the next tokens are `{%` followed by one of `names`.
    fn at_statement(&self, names: &[&str]) -> bool {
        self.is(TokenKind::OpenStatement)
            && self.peek_at(1).is_some_and(|t| {
                t.kind == TokenKind::Identifier && names.contains(&t.value.as_str())
            })
    }

    /// Consume `{% name %}`.
    fn expect_end_tag(&mut self, name: &str) -> JinjaResult<()> {
        self.expect(TokenKind::OpenStatement, &format!("'{{% {} %}}'", name))?;
        self.expect_keyword(name)?;
        self.expect(TokenKind::CloseStatement, "'%}'")?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn parse_any(&mut self) -> JinjaResult<Stmt> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Text => Ok(Stmt::Text(Text {
                text: token.value.clone(),
                offset: token.offset,
            })),
            TokenKind::Comment => Ok(Stmt::Comment(Comment {
                text: token.value.clone(),
                offset: token.offset,
            })),
            TokenKind::OpenStatement => self.parse_statement(token.offset),
            TokenKind::OpenExpression => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::CloseExpression, "'}}'")?;
                Ok(Stmt::Output(expr))
            }
            _ => Err(JinjaError::parse(
                format!("unexpected token '{}'", token.value),
                token.offset,
            )),
        }
    }

    /// Parse statements until one of `ends` is the next statement keyword.
    fn parse_body(&mut self, ends: &[&str]) -> JinjaResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.at_statement(ends) {
            if self.at_end() {
                return Err(self.unexpected(&format!("'{{% {} %}}'", ends.join(" / "))));
            }
            body.push(self.parse_any()?);
        }
        Ok(body)
    }

    fn parse_statement(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let keyword = self.expect_identifier()?;
        match keyword.value.as_str() {
            "set" => self.parse_set(offset),
            "if" => Ok(Stmt::If(self.parse_if(offset)?)),
            "for" => self.parse_for(offset),
            "macro" => self.parse_macro(offset),
            "call" => self.parse_call(offset),
            "filter" => self.parse_filter_block(offset),
            "break" => {
                self.expect(TokenKind::CloseStatement, "'%}'")?;
                Ok(Stmt::Break(offset))
            }
            "continue" => {
                self.expect(TokenKind::CloseStatement, "'%}'")?;
                Ok(Stmt::Continue(offset))
            }
            other => Err(JinjaError::parse(
                format!("unknown statement '{}'", other),
                keyword.offset,
            )),
        }
    }

    fn parse_set(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let target = self.parse_expression_sequence()?;
        validate_assignment_target(&target)?;

        if self.is(TokenKind::Equals) {
            self.advance()?;
            let value = self.parse_expression_sequence()?;
            self.expect(TokenKind::CloseStatement, "'%}'")?;
            return Ok(Stmt::Set(SetStmt {
                target,
                value: Some(value),
                body: Vec::new(),
                offset,
            }));
        }

        self.expect(TokenKind::CloseStatement, "'=' or '%}'")?;
        let body = self.parse_body(&["endset"])?;
        self.expect_end_tag("endset")?;
        Ok(Stmt::Set(SetStmt {
            target,
            value: None,
            body,
            offset,
        }))
    }

    /// Parse after `{% if` (or `{% elif`).
    fn parse_if(&mut self, offset: usize) -> JinjaResult<IfStmt> {
        let test = self.parse_expression()?;
        self.expect(TokenKind::CloseStatement, "'%}'")?;
        let body = self.parse_body(&["elif", "else", "endif"])?;

        let else_body = if self.at_statement(&["elif"]) {
            let elif_offset = self.offset();
            self.advance()?;
            self.advance()?;
            vec![Stmt::If(self.parse_if(elif_offset)?)]
        } else if self.at_statement(&["else"]) {
            self.advance()?;
            self.advance()?;
            self.expect(TokenKind::CloseStatement, "'%}'")?;
            let else_body = self.parse_body(&["endif"])?;
            self.expect_end_tag("endif")?;
            else_body
        } else {
            self.expect_end_tag("endif")?;
            Vec::new()
        };

        Ok(IfStmt {
            test,
            body,
            else_body,
            offset,
        })
    }

    fn parse_for(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let target = self.parse_target_sequence()?;
        self.expect_keyword("in")?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::CloseStatement, "'%}'")?;

        let body = self.parse_body(&["endfor", "else"])?;
        let mut else_body = Vec::new();
        if self.at_statement(&["else"]) {
            self.advance()?;
            self.advance()?;
            self.expect(TokenKind::CloseStatement, "'%}'")?;
            else_body = self.parse_body(&["endfor"])?;
        }
        self.expect_end_tag("endfor")?;

        Ok(Stmt::For(ForStmt {
            target,
            iterable,
            body,
            else_body,
            offset,
        }))
    }

    fn parse_macro(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let name = self.expect_identifier()?.value.clone();
        let params = self.parse_params()?;
        self.expect(TokenKind::CloseStatement, "'%}'")?;
        let body = self.parse_body(&["endmacro"])?;
        self.expect_end_tag("endmacro")?;
        Ok(Stmt::Macro(Rc::new(MacroDef {
            name,
            params,
            body,
            offset,
        })))
    }

    fn parse_call(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let params = if self.is(TokenKind::OpenParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let call = self.parse_expression()?;
        if !matches!(call.kind, ExprKind::Call { .. }) {
            return Err(JinjaError::parse(
                "call block requires a call expression",
                call.offset,
            ));
        }
        self.expect(TokenKind::CloseStatement, "'%}'")?;
        let body = self.parse_body(&["endcall"])?;
        self.expect_end_tag("endcall")?;
        Ok(Stmt::Call(CallStmt {
            call,
            caller: Rc::new(MacroDef {
                name: "caller".to_string(),
                params,
                body,
                offset,
            }),
            offset,
        }))
    }

    fn parse_filter_block(&mut self, offset: usize) -> JinjaResult<Stmt> {
        let filter = self.parse_filter_call()?;
        self.expect(TokenKind::CloseStatement, "'%}'")?;
        let body = self.parse_body(&["endfilter"])?;
        self.expect_end_tag("endfilter")?;
        Ok(Stmt::Filter(FilterStmt {
            filter,
            body,
            offset,
        }))
    }

    /// `(name, name=default, ...)` in a macro or call-block header.
    fn parse_params(&mut self) -> JinjaResult<Vec<MacroParam>> {
        self.expect(TokenKind::OpenParen, "'('")?;
        let mut params = Vec::new();
        while !self.is(TokenKind::CloseParen) {
            let name = self.expect_identifier()?.value.clone();
            let default = if self.is(TokenKind::Equals) {
                self.advance()?;
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(MacroParam { name, default });
            if self.is(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')'")?;
        Ok(params)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// `a, b, c` becomes a tuple; a single expression is returned as is.
    fn parse_expression_sequence(&mut self) -> JinjaResult<Expr> {
        let offset = self.offset();
        let first = self.parse_expression()?;
        if !self.is(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.is(TokenKind::Comma) {
            self.advance()?;
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), offset))
    }

    /// Loop targets: identifiers only, so `in` is not read as an operator.
    fn parse_target_sequence(&mut self) -> JinjaResult<Expr> {
        let offset = self.offset();
        let mut items = Vec::new();
        loop {
            let token = self.expect_identifier()?;
            items.push(Expr::new(
                ExprKind::Identifier(token.value.clone()),
                token.offset,
            ));
            if self.is(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        if items.len() == 1 {
            return Ok(items.remove(0));
        }
        Ok(Expr::new(ExprKind::Tuple(items), offset))
    }

    fn parse_expression(&mut self) -> JinjaResult<Expr> {
        let offset = self.offset();
        let value = self.parse_logical_or()?;
        if !self.is_keyword("if") {
            return Ok(value);
        }
        self.advance()?;
        let test = self.parse_logical_or()?;
        if self.is_keyword("else") {
            self.advance()?;
            let otherwise = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::Ternary {
                    condition: Box::new(test),
                    then: Box::new(value),
                    otherwise: Box::new(otherwise),
                },
                offset,
            ));
        }
        Ok(Expr::new(
            ExprKind::Select {
                value: Box::new(value),
                test: Box::new(test),
            },
            offset,
        ))
    }

    fn parse_logical_or(&mut self) -> JinjaResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.is_keyword("or") {
            self.advance()?;
            let right = self.parse_logical_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> JinjaResult<Expr> {
        let mut left = self.parse_logical_not()?;
        while self.is_keyword("and") {
            self.advance()?;
            let right = self.parse_logical_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_logical_not(&mut self) -> JinjaResult<Expr> {
        if self.is_keyword("not") {
            let offset = self.offset();
            self.advance()?;
            let operand = self.parse_logical_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                offset,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> JinjaResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.is(TokenKind::ComparisonOperator) {
                let token = self.advance()?;
                BinaryOp::from_token(&token.value)
                    .ok_or_else(|| JinjaError::parse("unknown operator", token.offset))?
            } else if self.is_keyword("in") {
                self.advance()?;
                BinaryOp::In
            } else if self.is_keyword("not")
                && self.peek_at(1).is_some_and(|t| {
                    t.kind == TokenKind::Identifier && t.value == "in"
                })
            {
                self.advance()?;
                self.advance()?;
                BinaryOp::NotIn
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> JinjaResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while self.is(TokenKind::AdditiveOperator) {
            let token = self.advance()?;
            let op = BinaryOp::from_token(&token.value)
                .ok_or_else(|| JinjaError::parse("unknown operator", token.offset))?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> JinjaResult<Expr> {
        let mut left = self.parse_test()?;
        while self.is(TokenKind::MultiplicativeOperator) {
            let token = self.advance()?;
            let op = BinaryOp::from_token(&token.value)
                .ok_or_else(|| JinjaError::parse("unknown operator", token.offset))?;
            let right = self.parse_test()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    /// Signs bind tighter than filters and tests: `-x|abs` is `(-x)|abs`.
    fn parse_unary(&mut self) -> JinjaResult<Expr> {
        if self.is(TokenKind::UnaryOperator) {
            let token = self.advance()?;
            let op = if token.value == "-" {
                UnaryOp::Neg
            } else {
                UnaryOp::Pos
            };
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                token.offset,
            ));
        }
        self.parse_call_member()
    }

    fn parse_test(&mut self) -> JinjaResult<Expr> {
        let mut operand = self.parse_filter()?;
        while self.is_keyword("is") {
            let offset = operand.offset;
            self.advance()?;
            let negate = if self.is_keyword("not") {
                self.advance()?;
                true
            } else {
                false
            };
            let name = self.expect(TokenKind::Identifier, "test name")?.value.clone();
            let args = if self.is(TokenKind::OpenParen) {
                self.parse_args()?
            } else {
                Vec::new()
            };
            operand = Expr::new(
                ExprKind::Test {
                    operand: Box::new(operand),
                    negate,
                    name,
                    args,
                },
                offset,
            );
        }
        Ok(operand)
    }

    fn parse_filter(&mut self) -> JinjaResult<Expr> {
        let mut operand = self.parse_unary()?;
        while self.is(TokenKind::Pipe) {
            let offset = operand.offset;
            self.advance()?;
            let filter = self.parse_filter_call()?;
            operand = Expr::new(
                ExprKind::Filter {
                    operand: Box::new(operand),
                    filter,
                },
                offset,
            );
        }
        Ok(operand)
    }

    fn parse_filter_call(&mut self) -> JinjaResult<FilterCall> {
        let name = self
            .expect(TokenKind::Identifier, "filter name")?
            .value
            .clone();
        let args = if self.is(TokenKind::OpenParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(FilterCall { name, args })
    }

    fn parse_call_member(&mut self) -> JinjaResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let offset = expr.offset;
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.advance()?;
                    let token = self.expect(TokenKind::Identifier, "attribute name")?;
                    let property = Expr::new(ExprKind::Identifier(token.value.clone()), token.offset);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: false,
                        },
                        offset,
                    );
                }
                Some(TokenKind::OpenSquareBracket) => {
                    self.advance()?;
                    let property = self.parse_subscript()?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: true,
                        },
                        offset,
                    );
                }
                Some(TokenKind::OpenParen) => {
                    let args = self.parse_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        offset,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parse after `[`: an index expression or a slice.
    fn parse_subscript(&mut self) -> JinjaResult<Expr> {
        let offset = self.offset();
        let mut slots: Vec<Option<Expr>> = Vec::new();
        let mut is_slice = false;

        while !self.is(TokenKind::CloseSquareBracket) {
            if self.is(TokenKind::Colon) {
                slots.push(None);
                self.advance()?;
                is_slice = true;
            } else {
                slots.push(Some(self.parse_expression()?));
                if self.is(TokenKind::Colon) {
                    self.advance()?;
                    is_slice = true;
                } else if !self.is(TokenKind::CloseSquareBracket) {
                    return Err(self.unexpected("':' or ']'"));
                }
            }
        }
        self.expect(TokenKind::CloseSquareBracket, "']'")?;

        if !is_slice {
            return match slots.pop() {
                Some(Some(index)) if slots.is_empty() => Ok(index),
                _ => Err(JinjaError::parse("expected index expression", offset)),
            };
        }
        if slots.len() > 3 {
            return Err(JinjaError::parse("too many slice arguments", offset));
        }
        let mut slots = slots.into_iter();
        let mut next = || slots.next().flatten().map(Box::new);
        let (start, stop, step) = (next(), next(), next());
        Ok(Expr::new(ExprKind::Slice { start, stop, step }, offset))
    }

    /// `(a, b, key=value, *spread)`
    fn parse_args(&mut self) -> JinjaResult<Vec<Expr>> {
        self.expect(TokenKind::OpenParen, "'('")?;
        let mut args = Vec::new();
        while !self.is(TokenKind::CloseParen) {
            let offset = self.offset();
            let arg = if self.peek().is_some_and(|t| {
                t.kind == TokenKind::MultiplicativeOperator && t.value == "*"
            }) {
                self.advance()?;
                let value = self.parse_expression()?;
                Expr::new(ExprKind::Spread(Box::new(value)), offset)
            } else {
                let expr = self.parse_expression()?;
                if self.is(TokenKind::Equals) {
                    let Some(key) = expr.as_identifier().map(str::to_string) else {
                        return Err(JinjaError::parse(
                            "keyword argument name must be an identifier",
                            expr.offset,
                        ));
                    };
                    self.advance()?;
                    let value = self.parse_expression()?;
                    Expr::new(
                        ExprKind::KeywordArg {
                            key,
                            value: Box::new(value),
                        },
                        offset,
                    )
                } else {
                    expr
                }
            };
            args.push(arg);
            if self.is(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> JinjaResult<Expr> {
        let token = self.advance()?;
        let offset = token.offset;
        let kind = match token.kind {
            TokenKind::NumericLiteral => parse_number(&token.value, offset)?,
            TokenKind::StringLiteral => {
                let mut value = token.value.clone();
                while self.is(TokenKind::StringLiteral) {
                    value.push_str(&self.advance()?.value);
                }
                ExprKind::Str(value)
            }
            TokenKind::Identifier => match token.value.as_str() {
                "true" | "True" => ExprKind::Bool(true),
                "false" | "False" => ExprKind::Bool(false),
                "none" | "None" => ExprKind::None,
                name => ExprKind::Identifier(name.to_string()),
            },
            TokenKind::OpenParen => {
                if self.is(TokenKind::CloseParen) {
                    self.advance()?;
                    ExprKind::Tuple(Vec::new())
                } else {
                    let inner = self.parse_expression_sequence()?;
                    self.expect(TokenKind::CloseParen, "')'")?;
                    return Ok(Expr::new(inner.kind, offset));
                }
            }
            TokenKind::OpenSquareBracket => {
                let mut items = Vec::new();
                while !self.is(TokenKind::CloseSquareBracket) {
                    items.push(self.parse_expression()?);
                    if self.is(TokenKind::Comma) {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::CloseSquareBracket, "']'")?;
                ExprKind::Array(items)
            }
            TokenKind::OpenCurlyBracket => {
                let mut entries = Vec::new();
                while !self.is(TokenKind::CloseCurlyBracket) {
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::Colon, "':'")?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if self.is(TokenKind::Comma) {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::CloseCurlyBracket, "'}'")?;
                ExprKind::Object(entries)
            }
            _ => {
                return Err(JinjaError::parse(
                    format!("unexpected token '{}'", token.value),
                    offset,
                ));
            }
        };
        Ok(Expr::new(kind, offset))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let offset = left.offset;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        offset,
    )
}

fn parse_number(text: &str, offset: usize) -> JinjaResult<ExprKind> {
    if text.contains('.') {
        text.parse::<f64>()
            .map(ExprKind::Float)
            .map_err(|_| JinjaError::parse(format!("invalid number '{}'", text), offset))
    } else {
        text.parse::<i64>()
            .map(ExprKind::Int)
            .map_err(|_| JinjaError::parse(format!("invalid number '{}'", text), offset))
    }
}

fn validate_assignment_target(target: &Expr) -> JinjaResult<()> {
    let valid = match &target.kind {
        ExprKind::Identifier(_) => true,
        ExprKind::Tuple(items) => items.iter().all(|i| i.as_identifier().is_some()),
        ExprKind::Member {
            property, computed, ..
        } => !computed && property.as_identifier().is_some(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(JinjaError::parse(
            format!("invalid assignment target ({})", target.node_name()),
            target.offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexerOptions;
    use crate::error::ErrorKind;
    use crate::lexer::tokenize;

    fn parse_str(source: &str) -> JinjaResult<Program> {
        let lexed = tokenize(source, &LexerOptions::default())?;
        parse(&lexed.tokens)
    }

    fn parse_expr(source: &str) -> Expr {
        let program = parse_str(&format!("{{{{ {} }}}}", source)).unwrap();
        match program.body.into_iter().next() {
            Some(Stmt::Output(expr)) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    #[test]
    fn test_precedence_multiplicative_over_additive() {
        let expr = parse_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comparison_is_left_associative() {
        let expr = parse_expr("a < b < c");
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Lt,
                left,
                ..
            } => assert!(matches!(
                left.kind,
                ExprKind::Binary {
                    op: BinaryOp::Lt,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_in() {
        let expr = parse_expr("'a' not in xs");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::NotIn,
                ..
            }
        ));
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = parse_expr("not a == b");
        match expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => assert!(matches!(
                operand.kind,
                ExprKind::Binary {
                    op: BinaryOp::Eq,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_select_and_ternary() {
        assert!(matches!(parse_expr("a if b").kind, ExprKind::Select { .. }));
        assert!(matches!(
            parse_expr("a if b else c").kind,
            ExprKind::Ternary { .. }
        ));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("True").kind, ExprKind::Bool(true));
        assert_eq!(parse_expr("none").kind, ExprKind::None);
        assert_eq!(parse_expr("-3").kind, ExprKind::Int(-3));
        assert_eq!(parse_expr("2.5").kind, ExprKind::Float(2.5));
        assert_eq!(parse_expr("-1.5").kind, ExprKind::Float(-1.5));
        assert_eq!(
            parse_expr("'a' \"b\" 'c'").kind,
            ExprKind::Str("abc".to_string())
        );
    }

    #[test]
    fn test_tuple_and_grouping() {
        assert!(matches!(parse_expr("(1, 2)").kind, ExprKind::Tuple(ref v) if v.len() == 2));
        assert!(matches!(
            parse_expr("(1 + 2)").kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_object_literal() {
        match parse_expr("{'a': 1, 'b': {'c': 2}}").kind {
            ExprKind::Object(entries) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_chain_and_test() {
        match parse_expr("x | trim | upper is not none").kind {
            ExprKind::Test {
                operand,
                negate,
                name,
                ..
            } => {
                assert!(negate);
                assert_eq!(name, "none");
                match operand.kind {
                    ExprKind::Filter { filter, operand } => {
                        assert_eq!(filter.name, "upper");
                        assert!(matches!(operand.kind, ExprKind::Filter { .. }));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sign_binds_tighter_than_filter_and_test() {
        match parse_expr("-x | abs").kind {
            ExprKind::Filter { filter, operand } => {
                assert_eq!(filter.name, "abs");
                assert!(matches!(
                    operand.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_expr("-x is number").kind {
            ExprKind::Test { operand, .. } => {
                assert!(matches!(operand.kind, ExprKind::Unary { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_arguments() {
        match parse_expr("f(1, key='v', *rest)").kind {
            ExprKind::Call { args, .. } => {
                assert_eq!(args.len(), 3);
                assert!(matches!(args[1].kind, ExprKind::KeywordArg { ref key, .. } if key == "key"));
                assert!(matches!(args[2].kind, ExprKind::Spread(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slices() {
        let slice = |src: &str| match parse_expr(src).kind {
            ExprKind::Member {
                property, computed, ..
            } => {
                assert!(computed);
                match property.kind {
                    ExprKind::Slice { start, stop, step } => {
                        (start.is_some(), stop.is_some(), step.is_some())
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(slice("a[1:]"), (true, false, false));
        assert_eq!(slice("a[:2]"), (false, true, false));
        assert_eq!(slice("a[::-1]"), (false, false, true));
        assert_eq!(slice("a[1:-1:2]"), (true, true, true));
        assert!(matches!(
            parse_expr("a[0]").kind,
            ExprKind::Member { ref property, .. } if property.kind == ExprKind::Int(0)
        ));
    }

    // ========================================================================
    // Statements
    // ========================================================================

    #[test]
    fn test_if_elif_else() {
        let program =
            parse_str("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        match &program.body[0] {
            Stmt::If(stmt) => {
                assert_eq!(stmt.body.len(), 1);
                match &stmt.else_body[0] {
                    Stmt::If(elif) => assert_eq!(elif.else_body.len(), 1),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_with_filter_and_else() {
        let program =
            parse_str("{% for k, v in items if v %}x{% else %}empty{% endfor %}").unwrap();
        match &program.body[0] {
            Stmt::For(stmt) => {
                assert!(matches!(stmt.target.kind, ExprKind::Tuple(ref v) if v.len() == 2));
                assert!(matches!(stmt.iterable.kind, ExprKind::Select { .. }));
                assert_eq!(stmt.else_body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_forms() {
        let program = parse_str(
            "{% set x = 1 %}{% set a, b = 1, 2 %}{% set ns.n = 3 %}{% set block %}hi{% endset %}",
        )
        .unwrap();
        assert_eq!(program.body.len(), 4);
        match &program.body[3] {
            Stmt::Set(stmt) => {
                assert!(stmt.value.is_none());
                assert_eq!(stmt.body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_str("{% set 1 = 2 %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("invalid assignment target"));
    }

    #[test]
    fn test_macro_with_defaults() {
        let program =
            parse_str("{% macro greet(name, punct='!') %}hi{% endmacro %}").unwrap();
        match &program.body[0] {
            Stmt::Macro(def) => {
                assert_eq!(def.name, "greet");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[0].default.is_none());
                assert!(def.params[1].default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_and_filter_blocks() {
        let program = parse_str(
            "{% call(item) render(1) %}{{ item }}{% endcall %}{% filter upper %}x{% endfilter %}",
        )
        .unwrap();
        match &program.body[0] {
            Stmt::Call(stmt) => {
                assert_eq!(stmt.caller.name, "caller");
                assert_eq!(stmt.caller.params.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&program.body[1], Stmt::Filter(f) if f.filter.name == "upper"));
    }

    #[test]
    fn test_unknown_statement() {
        let err = parse_str("{% frobnicate %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("unknown statement 'frobnicate'"));
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn test_missing_end_tag() {
        let err = parse_str("{% if x %}never closed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("endif"));
    }

    #[test]
    fn test_token_mismatch() {
        let err = parse_str("{{ (1 + 2 }}").unwrap_err();
        assert!(err.to_string().contains("expected ')'"));
    }
}
