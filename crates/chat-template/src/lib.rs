/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Jinja2-compatible template engine for chat prompts.
//!
//! Model checkpoints ship a Jinja2 template that turns a conversation
//! (`messages`, `tools`, `add_generation_prompt`, ...) into the exact prompt
//! text the model was trained on. This crate renders those templates
//! without a Python runtime. It supports:
//!
//! - Output and comments: `{{ expr }}`, `{# ... #}`, with `-` trim markers
//! - Control flow: `if`/`elif`/`else`, `for ... if ...` with `loop`
//!   metadata, `break`/`continue`
//! - Assignment: `set`, tuple unpacking, block capture, `namespace()`
//! - Macros, call blocks with `caller()`, and filter blocks
//! - Python-flavored string, list and dict methods, filters and tests
//!
//! # Architecture
//!
//! Source text is preprocessed for whitespace control and lexed into
//! tokens ([`lexer`]), parsed into an AST ([`parser`], [`ast`]) and executed
//! by a tree-walking interpreter ([`vm`]). Strings track which parts came
//! from caller input ([`JinjaString`]), which lets the capability prober
//! ([`caps`]) see how a template treats message content.
//!
//! # Example
//!
//! ```ignore
//! use chat_template::Template;
//! use serde_json::json;
//!
//! let template = Template::compile(
//!     "{% for m in messages %}<{{ m.role }}>{{ m.content }}{% endfor %}",
//! )?;
//! let prompt = template.render_json(&json!({
//!     "messages": [{"role": "user", "content": "Hi"}]
//! }))?;
//! assert_eq!(prompt, "<user>Hi");
//! ```

pub mod ast;
pub mod builtins;
pub mod caps;
pub mod config;
pub mod context;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod string;
pub mod template;
pub mod value;
pub mod vm;

// Re-export main types at crate root
pub use builtins::{dump_json, JsonOptions};
pub use caps::{probe, Capabilities};
pub use config::{EngineConfig, LexerOptions, Workarounds};
pub use context::Context;
pub use error::{ErrorKind, JinjaError, JinjaResult};
pub use string::{JinjaString, StringPart};
pub use template::Template;
pub use value::{Array, Function, Object, Value};
