/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tokenizer for Jinja2 chat templates.
//!
//! Tokenizing happens in two stages. [`preprocess`] applies whitespace
//! control (trailing newline, `lstrip_blocks`, `trim_blocks`, `-` markers)
//! and drops the non-standard `{% generation %}` tags. The scanner then
//! alternates between text mode and code mode over the preprocessed source.
//! Token offsets are byte offsets into that preprocessed source, which is
//! returned alongside the tokens so errors can point into it.

use crate::config::LexerOptions;
use crate::error::{JinjaError, JinjaResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Kinds of tokens produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Template text between tags.
    Text,
    NumericLiteral,
    StringLiteral,
    Identifier,
    /// `=`
    Equals,
    OpenParen,
    CloseParen,
    /// `{%`
    OpenStatement,
    /// `%}`
    CloseStatement,
    /// `{{`
    OpenExpression,
    /// `}}`
    CloseExpression,
    OpenSquareBracket,
    CloseSquareBracket,
    OpenCurlyBracket,
    CloseCurlyBracket,
    Comma,
    Dot,
    Colon,
    Pipe,
    /// `+ - ~`
    AdditiveOperator,
    /// `* / // %`
    MultiplicativeOperator,
    /// `< > <= >= == !=`
    ComparisonOperator,
    /// Prefix `+` or `-`
    UnaryOperator,
    /// Body of a `{# ... #}` comment.
    Comment,
}

/// A single token with its raw text and byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            offset,
        }
    }
}

/// Output of [`tokenize`].
#[derive(Debug, Clone)]
pub struct LexerResult {
    pub tokens: Vec<Token>,
    /// The preprocessed source the token offsets refer to.
    pub source: String,
}

/// Longest-match table. Multi-character sequences come before their
/// single-character prefixes.
const OPERATOR_TABLE: &[(&str, TokenKind)] = &[
    ("{%", TokenKind::OpenStatement),
    ("%}", TokenKind::CloseStatement),
    ("{{", TokenKind::OpenExpression),
    ("}}", TokenKind::CloseExpression),
    ("(", TokenKind::OpenParen),
    (")", TokenKind::CloseParen),
    ("{", TokenKind::OpenCurlyBracket),
    ("}", TokenKind::CloseCurlyBracket),
    ("[", TokenKind::OpenSquareBracket),
    ("]", TokenKind::CloseSquareBracket),
    (",", TokenKind::Comma),
    (".", TokenKind::Dot),
    (":", TokenKind::Colon),
    ("|", TokenKind::Pipe),
    ("<=", TokenKind::ComparisonOperator),
    (">=", TokenKind::ComparisonOperator),
    ("==", TokenKind::ComparisonOperator),
    ("!=", TokenKind::ComparisonOperator),
    ("<", TokenKind::ComparisonOperator),
    (">", TokenKind::ComparisonOperator),
    ("+", TokenKind::AdditiveOperator),
    ("-", TokenKind::AdditiveOperator),
    ("~", TokenKind::AdditiveOperator),
    ("*", TokenKind::MultiplicativeOperator),
    ("//", TokenKind::MultiplicativeOperator),
    ("/", TokenKind::MultiplicativeOperator),
    ("%", TokenKind::MultiplicativeOperator),
    ("=", TokenKind::Equals),
];

static LSTRIP_BLOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+(\{[%#])").expect("valid regex"));
static TRIM_BLOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([#%-]\})\n").expect("valid regex"));
static GENERATION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%\s*generation\s*%\}").expect("valid regex"));
static END_GENERATION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%\s*endgeneration\s*%\}").expect("valid regex"));

/// Apply whitespace control and drop `generation` markers.
pub fn preprocess(source: &str, options: &LexerOptions) -> String {
    let mut result = source.strip_suffix('\n').unwrap_or(source).to_string();

    if options.lstrip_blocks {
        result = LSTRIP_BLOCKS.replace_all(&result, "$1").into_owned();
    }

    if options.trim_blocks {
        result = TRIM_BLOCKS.replace_all(&result, "$1").into_owned();
    }

    result = trim_markers(&result);

    result = GENERATION_TAG.replace_all(&result, "").into_owned();
    END_GENERATION_TAG.replace_all(&result, "").into_owned()
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Resolve `{X-` and `-X}` markers (X one of `%`, `{`/`}`, `#`).
///
/// The marker is collapsed to a plain tag and the whitespace on the marked
/// side is removed. Only ASCII bytes are removed or inserted, so the result
/// stays valid UTF-8.
fn trim_markers(s: &str) -> String {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut out: Vec<u8> = Vec::with_capacity(len);
    let mut i = 0;

    while i < len {
        if i + 2 < len {
            let (c1, c2, c3) = (bytes[i], bytes[i + 1], bytes[i + 2]);

            if c1 == b'-' && c3 == b'}' && matches!(c2, b'%' | b'}' | b'#') {
                out.push(c2);
                out.push(b'}');
                i += 3;
                while i < len && is_space(bytes[i]) {
                    i += 1;
                }
                continue;
            }

            if c1 == b'{' && c3 == b'-' && matches!(c2, b'%' | b'{' | b'#') {
                while out.last().is_some_and(|b| is_space(*b)) {
                    out.pop();
                }
                // keep a literal '{' from merging with the tag opener
                if out.last() == Some(&b'{') {
                    out.push(b' ');
                }
                out.push(b'{');
                out.push(c2);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Tokenize a template.
pub fn tokenize(source: &str, options: &LexerOptions) -> JinjaResult<LexerResult> {
    let src = preprocess(source, options);
    tracing::trace!(
        original_len = source.len(),
        preprocessed_len = src.len(),
        "preprocessed template"
    );

    let tokens = Scanner::new(&src).run()?;
    tracing::trace!(tokens = tokens.len(), "tokenized template");

    Ok(LexerResult {
        tokens,
        source: src,
    })
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    curly_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            curly_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|t| t.kind)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn at_tag_start(&self) -> bool {
        self.peek(0) == Some(b'{') && matches!(self.peek(1), Some(b'%' | b'{' | b'#'))
    }

    fn run(mut self) -> JinjaResult<Vec<Token>> {
        while self.pos < self.bytes.len() {
            let in_text = matches!(
                self.last_kind(),
                None | Some(TokenKind::CloseStatement)
                    | Some(TokenKind::CloseExpression)
                    | Some(TokenKind::Comment)
            );
            if in_text && self.scan_text() {
                continue;
            }

            if self.peek(0) == Some(b'{') && self.peek(1) == Some(b'#') {
                self.scan_comment()?;
                continue;
            }

            while self.peek(0).is_some_and(is_space) {
                self.pos += 1;
            }
            let Some(ch) = self.peek(0) else {
                break;
            };

            if (ch == b'-' || ch == b'+') && self.scan_sign(ch)? {
                continue;
            }

            if self.scan_operator() {
                continue;
            }

            match ch {
                b'\'' | b'"' => self.scan_string(ch)?,
                b'0'..=b'9' => self.scan_number(),
                c if c.is_ascii_alphabetic() || c == b'_' => self.scan_identifier(),
                _ => {
                    let found = self.src[self.pos..].chars().next().unwrap_or('?');
                    return Err(JinjaError::lex(
                        format!("unexpected character: {}", found),
                        self.pos,
                    ));
                }
            }
        }
        Ok(self.tokens)
    }

    /// Consume text up to the next tag. Returns false if there was none.
    fn scan_text(&mut self) -> bool {
        let start = self.pos;
        while self.pos < self.bytes.len() && !self.at_tag_start() {
            self.pos += 1;
        }
        if self.pos == start {
            return false;
        }
        self.tokens
            .push(Token::new(TokenKind::Text, &self.src[start..self.pos], start));
        true
    }

    fn scan_comment(&mut self) -> JinjaResult<()> {
        let start = self.pos;
        let body_start = start + 2;
        match self.src[body_start..].find("#}") {
            Some(rel) => {
                let body = &self.src[body_start..body_start + rel];
                self.tokens.push(Token::new(TokenKind::Comment, body, start));
                self.pos = body_start + rel + 2;
                Ok(())
            }
            None => Err(JinjaError::lex("missing end of comment tag", start)),
        }
    }

    /// Handle a leading `+`/`-`. Returns true if a unary token was emitted;
    /// false leaves the sign for the operator table.
    fn scan_sign(&mut self, ch: u8) -> JinjaResult<bool> {
        let start = self.pos;
        match self.last_kind() {
            None | Some(TokenKind::Text) => Err(JinjaError::lex(
                format!("unexpected character: {}", ch as char),
                start,
            )),
            Some(
                TokenKind::Identifier
                | TokenKind::NumericLiteral
                | TokenKind::StringLiteral
                | TokenKind::CloseParen
                | TokenKind::CloseSquareBracket,
            ) => Ok(false),
            Some(_) => {
                self.pos += 1;
                let digits_start = self.pos;
                self.skip_number_body();
                let kind = if self.pos == digits_start {
                    TokenKind::UnaryOperator
                } else {
                    TokenKind::NumericLiteral
                };
                self.tokens
                    .push(Token::new(kind, &self.src[start..self.pos], start));
                Ok(true)
            }
        }
    }

    fn scan_operator(&mut self) -> bool {
        let rest = &self.bytes[self.pos..];
        for (seq, kind) in OPERATOR_TABLE {
            // inside an object literal "}}" closes two objects
            if *seq == "}}" && self.curly_depth > 0 {
                continue;
            }
            if rest.starts_with(seq.as_bytes()) {
                match kind {
                    TokenKind::OpenExpression => self.curly_depth = 0,
                    TokenKind::OpenCurlyBracket => self.curly_depth += 1,
                    TokenKind::CloseCurlyBracket => {
                        self.curly_depth = self.curly_depth.saturating_sub(1)
                    }
                    _ => {}
                }
                self.tokens.push(Token::new(*kind, *seq, self.pos));
                self.pos += seq.len();
                return true;
            }
        }
        false
    }

    fn scan_string(&mut self, quote: u8) -> JinjaResult<()> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(b) = self.peek(0) else {
                return Err(JinjaError::lex("unterminated string literal", start));
            };
            if b == quote {
                self.pos += 1;
                break;
            }
            if b == b'\\' {
                let Some(escaped) = self.peek(1) else {
                    return Err(JinjaError::lex(
                        "unexpected end of input after escape character",
                        self.pos,
                    ));
                };
                let unescaped = match escaped {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'b' => '\u{08}',
                    b'f' => '\u{0c}',
                    b'v' => '\u{0b}',
                    b'\\' => '\\',
                    b'\'' => '\'',
                    b'"' => '"',
                    _ => {
                        let found = self.src[self.pos + 1..].chars().next().unwrap_or('?');
                        return Err(JinjaError::lex(
                            format!("unknown escape character \\{}", found),
                            self.pos,
                        ));
                    }
                };
                value.push(unescaped);
                self.pos += 2;
                continue;
            }
            let c = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
            value.push(c);
            self.pos += c.len_utf8();
        }
        self.tokens
            .push(Token::new(TokenKind::StringLiteral, value, start));
        Ok(())
    }

    /// Advance over `digits` or `digits.digits`; no-op if no digit follows.
    fn skip_number_body(&mut self) {
        if !self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            return;
        }
        while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
    }

    fn scan_number(&mut self) {
        let start = self.pos;
        self.skip_number_body();
        self.tokens.push(Token::new(
            TokenKind::NumericLiteral,
            &self.src[start..self.pos],
            start,
        ));
    }

    fn scan_identifier(&mut self) {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        self.tokens.push(Token::new(
            TokenKind::Identifier,
            &self.src[start..self.pos],
            start,
        ));
    }
}
