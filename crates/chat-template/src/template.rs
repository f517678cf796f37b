/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled templates.
//!
//! A [`Template`] is parsed once and rendered any number of times. Each
//! render runs in a fresh scope copied from the caller's [`Context`], so
//! variables assigned by the template never leak back to the caller.

use crate::ast::Program;
use crate::caps::{self, Capabilities};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::JinjaResult;
use crate::lexer::{preprocess, tokenize};
use crate::parser::parse;
use crate::string::JinjaString;
use crate::vm;

/// A parsed template ready for rendering.
#[derive(Debug, Clone)]
pub struct Template {
    program: Program,

    /// Preprocessed source; error offsets refer to this text.
    source: String,

    config: EngineConfig,
}

impl Template {
    /// Compile a template with the default configuration.
    pub fn compile(source: &str) -> JinjaResult<Self> {
        Self::compile_with_options(source, &EngineConfig::default())
    }

    /// Compile a template with explicit whitespace and compatibility options.
    ///
    /// Lex and parse errors carry a source excerpt.
    pub fn compile_with_options(source: &str, config: &EngineConfig) -> JinjaResult<Self> {
        let lexed = tokenize(source, &config.lexer)
            .map_err(|e| e.with_snippet(&preprocess(source, &config.lexer)))?;
        let program = parse(&lexed.tokens).map_err(|e| e.with_snippet(&lexed.source))?;
        tracing::debug!(
            tokens = lexed.tokens.len(),
            statements = program.body.len(),
            "compiled template"
        );
        Ok(Self {
            program,
            source: lexed.source,
            config: *config,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The preprocessed source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render to a plain string.
    pub fn render(&self, context: &Context) -> JinjaResult<String> {
        Ok(self.render_parts(context)?.to_string())
    }

    /// Render, keeping the provenance of every output part.
    ///
    /// Input operations recorded during the render are visible through
    /// `context.input_ops()` afterwards.
    pub fn render_parts(&self, context: &Context) -> JinjaResult<JinjaString> {
        let scope = context.render_scope(self.config.workarounds);
        vm::execute(&self.program, &scope).map_err(|e| e.with_snippet(&self.source))
    }

    /// Render with variables taken from a JSON object.
    pub fn render_json(&self, data: &serde_json::Value) -> JinjaResult<String> {
        self.render(&Context::from_json(data)?)
    }

    /// Probe what this template expects from its input.
    pub fn capabilities(&self) -> Capabilities {
        caps::probe(self)
    }
}
