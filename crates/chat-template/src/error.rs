/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for lexing, parsing and rendering chat templates.
//!
//! Every failure surfaces as a single [`JinjaError`]. Errors that can be tied
//! to a position in the template carry a byte offset into the preprocessed
//! source, and [`JinjaError::with_snippet`] attaches an ariadne excerpt with a
//! caret at that offset.

use thiserror::Error;

/// Broad category of a [`JinjaError`], independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token stream.
    Lex,
    /// Grammar mismatch, unknown statement keyword, bad assignment target.
    Parse,
    /// Operator or builtin applied to the wrong kind of value.
    Type,
    /// The template called `raise_exception(msg)`.
    Raised,
    /// A recognized builtin that is not implemented.
    NotImplemented,
}

/// Errors that can occur while compiling or rendering a template.
#[derive(Debug, Clone, Error)]
pub enum JinjaError {
    /// The lexer could not tokenize the template.
    #[error("Lexer error: {message}{}", snippet_suffix(.snippet))]
    Lex {
        message: String,
        offset: usize,
        snippet: Option<String>,
    },

    /// The token stream does not match the grammar.
    #[error("Parse error: {message}{}", snippet_suffix(.snippet))]
    Parse {
        message: String,
        offset: usize,
        snippet: Option<String>,
    },

    /// A value of the wrong type reached an operator or builtin.
    #[error("Type error: {message}")]
    Type { message: String },

    /// Explicit rejection by the template. The message is kept verbatim.
    #[error("{message}")]
    Raised { message: String },

    /// Builtin that is recognized but not implemented.
    #[error("Not implemented: {message}")]
    NotImplemented { message: String },

    /// Failure while executing a node, wrapping the underlying error.
    #[error("{node} at byte {offset}: {source}{}", snippet_suffix(.snippet))]
    Runtime {
        node: &'static str,
        offset: usize,
        snippet: Option<String>,
        #[source]
        source: Box<JinjaError>,
    },
}

/// Result type for template operations.
pub type JinjaResult<T> = Result<T, JinjaError>;

fn snippet_suffix(snippet: &Option<String>) -> String {
    match snippet {
        Some(s) => format!("\n{}", s),
        None => String::new(),
    }
}

impl JinjaError {
    pub fn lex(message: impl Into<String>, offset: usize) -> Self {
        JinjaError::Lex {
            message: message.into(),
            offset,
            snippet: None,
        }
    }

    pub fn parse(message: impl Into<String>, offset: usize) -> Self {
        JinjaError::Parse {
            message: message.into(),
            offset,
            snippet: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        JinjaError::Type {
            message: message.into(),
        }
    }

    pub fn raised(message: impl Into<String>) -> Self {
        JinjaError::Raised {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        JinjaError::NotImplemented {
            message: message.into(),
        }
    }

    /// Wrap this error with the kind and offset of the node that failed.
    ///
    /// Errors that already carry a position are returned unchanged, so the
    /// innermost failing node is the one reported.
    pub fn at_node(self, node: &'static str, offset: usize) -> Self {
        match self {
            JinjaError::Runtime { .. } | JinjaError::Lex { .. } | JinjaError::Parse { .. } => self,
            other => JinjaError::Runtime {
                node,
                offset,
                snippet: None,
                source: Box::new(other),
            },
        }
    }

    /// The category of this error, looking through the runtime wrapper.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JinjaError::Lex { .. } => ErrorKind::Lex,
            JinjaError::Parse { .. } => ErrorKind::Parse,
            JinjaError::Type { .. } => ErrorKind::Type,
            JinjaError::Raised { .. } => ErrorKind::Raised,
            JinjaError::NotImplemented { .. } => ErrorKind::NotImplemented,
            JinjaError::Runtime { source, .. } => source.kind(),
        }
    }

    /// The message passed to `raise_exception`, if the template raised one.
    pub fn raised_message(&self) -> Option<&str> {
        match self {
            JinjaError::Raised { message } => Some(message),
            JinjaError::Runtime { source, .. } => source.raised_message(),
            _ => None,
        }
    }

    /// Byte offset into the preprocessed source, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            JinjaError::Lex { offset, .. }
            | JinjaError::Parse { offset, .. }
            | JinjaError::Runtime { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Attach a source excerpt pointing at this error's offset.
    ///
    /// `source` must be the preprocessed template text the offsets refer to.
    /// Errors without a position are returned unchanged.
    pub fn with_snippet(mut self, source: &str) -> Self {
        let Some(offset) = self.offset() else {
            return self;
        };
        let label = match &self {
            JinjaError::Runtime { source: inner, .. } => inner.to_string(),
            JinjaError::Lex { message, .. } | JinjaError::Parse { message, .. } => message.clone(),
            _ => return self,
        };
        let title = match &self {
            JinjaError::Lex { .. } => "Lexer error".to_string(),
            JinjaError::Parse { .. } => "Parse error".to_string(),
            JinjaError::Runtime { node, .. } => format!("Error in {}", node),
            _ => return self,
        };
        let rendered = render_snippet(source, offset, &title, &label);
        match &mut self {
            JinjaError::Lex { snippet, .. }
            | JinjaError::Parse { snippet, .. }
            | JinjaError::Runtime { snippet, .. } => *snippet = rendered,
            _ => {}
        }
        self
    }
}

/// Render an ariadne report for a single position in `source`.
fn render_snippet(source: &str, offset: usize, title: &str, label: &str) -> Option<String> {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    const NAME: &str = "<template>";

    // ariadne spans are measured in characters
    let offset = offset.min(source.len());
    let start = source.get(..offset)?.chars().count();
    let end = if start < source.chars().count() {
        start + 1
    } else {
        start
    };

    let report = Report::build(ReportKind::Error, NAME, start)
        .with_config(Config::default().with_color(false))
        .with_message(title)
        .with_label(Label::new((NAME, start..end)).with_message(label))
        .finish();

    let mut output = Vec::new();
    report
        .write((NAME, Source::from(source.to_string())), &mut output)
        .ok()?;
    String::from_utf8(output).ok()
}
