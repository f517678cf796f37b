/*
 * caps.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Capability probing.
//!
//! Chat templates make undocumented assumptions about the conversation they
//! receive. [`probe`] renders a template against small synthetic
//! conversations and reports what it tolerates. Render failures during
//! probing are logged and never returned.

use crate::context::Context;
use crate::error::{JinjaError, JinjaResult};
use crate::string::JinjaString;
use crate::template::Template;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

const USER_TEXT: &str = "User message";
const SYSTEM_SENTINEL: &str = "<probe-system-sentinel>";
const TOOL_SENTINEL: &str = "probe_tool_sentinel";
const CALL_SENTINEL: &str = "probe_call_sentinel";
const SECOND_CALL_SENTINEL: &str = "probe_second_call_sentinel";

/// What a template supports or requires from its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_tools: bool,
    pub supports_tool_calls: bool,
    pub supports_system_role: bool,
    pub supports_parallel_tool_calls: bool,

    /// Message content must be passed as an array of typed parts because
    /// the template indexes or iterates it.
    pub requires_typed_content: bool,

    /// Message content may be passed as an array of typed parts.
    pub supports_typed_content: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
            supports_tool_calls: true,
            supports_system_role: true,
            supports_parallel_tool_calls: true,
            requires_typed_content: false,
            supports_typed_content: true,
        }
    }
}

impl Capabilities {
    /// Adjust a render context to what the template expects.
    ///
    /// When typed content is required, string message contents become a
    /// single `{"type": "text", "text": ...}` part. Variables that some
    /// templates read without checking (`guideline`, `functions`,
    /// `datetime`, `system_message`) are bound to `""` when unset.
    pub fn apply_workarounds(&self, ctx: &mut Context) -> JinjaResult<()> {
        if self.requires_typed_content {
            match ctx.get("messages") {
                None => {}
                Some(Value::Array(messages)) => {
                    for message in messages.to_vec() {
                        let Value::Object(message) = message else {
                            return Err(JinjaError::type_error(format!(
                                "expected each message to be an object, got {}",
                                message.type_name()
                            )));
                        };
                        wrap_content(&message);
                    }
                }
                Some(other) => {
                    return Err(JinjaError::type_error(format!(
                        "expected messages to be an array, got {}",
                        other.type_name()
                    )))
                }
            }
        }

        for name in ["guideline", "functions", "datetime", "system_message"] {
            if ctx.get(name).map_or(true, |v| v.is_undefined()) {
                ctx.set(name, Value::string(""));
            }
        }
        Ok(())
    }
}

/// Replace non-array content with one text part. Strings keep their
/// provenance.
fn wrap_content(message: &Object) {
    let text = match message.get("content") {
        Some(Value::Array(_)) => return,
        Some(Value::String(s)) => s,
        Some(Value::None | Value::Undefined) | None => JinjaString::new(""),
        Some(other) => other.to_display(),
    };
    let mut part = IndexMap::new();
    part.insert("type".to_string(), Value::string("text"));
    part.insert("text".to_string(), Value::String(text));
    message.insert("content", Value::array(vec![Value::object(part)]));
}

// ============================================================================
// Probes
// ============================================================================

/// A probe context with the variables every chat template reads.
fn probe_context(messages: serde_json::Value, tools: serde_json::Value) -> Context {
    let mut ctx = Context::new();
    ctx.set_json("messages", &messages);
    ctx.set_json("tools", &tools);
    ctx.set("add_generation_prompt", Value::Bool(true));
    ctx.set("bos_token", Value::string(""));
    ctx.set("eos_token", Value::string(""));
    ctx
}

/// Render, swallowing and logging any failure.
fn try_render(template: &Template, ctx: &Context, probe: &'static str) -> Option<String> {
    match template.render(ctx) {
        Ok(out) => {
            tracing::debug!(probe, len = out.len(), "probe rendered");
            Some(out)
        }
        Err(err) => {
            tracing::debug!(probe, error = %err, "probe failed");
            None
        }
    }
}

/// True when a render succeeds and contains every sentinel. The context is
/// first shaped by the capabilities found so far.
fn renders_with(
    template: &Template,
    caps: &Capabilities,
    mut ctx: Context,
    probe: &'static str,
    sentinels: &[&str],
) -> bool {
    if let Err(err) = caps.apply_workarounds(&mut ctx) {
        tracing::debug!(probe, error = %err, "probe setup failed");
        return false;
    }
    try_render(template, &ctx, probe)
        .is_some_and(|out| sentinels.iter().all(|s| out.contains(s)))
}

fn string_content_probe(template: &Template) -> bool {
    let ctx = probe_context(json!([{"role": "user", "content": USER_TEXT}]), json!([]));
    if let Some(Value::Array(messages)) = ctx.get("messages") {
        if let Some(Value::Object(message)) = messages.get(0) {
            message.insert("content", Value::String(JinjaString::input(USER_TEXT)));
        }
    }
    let _ = try_render(template, &ctx, "string_content");
    let ops = ctx.input_ops();
    tracing::debug!(?ops, "operations on input content");
    !ops.is_empty()
}

fn typed_content_probe(template: &Template) -> bool {
    let ctx = probe_context(
        json!([{"role": "user", "content": [{"type": "text", "text": USER_TEXT}]}]),
        json!([]),
    );
    try_render(template, &ctx, "typed_content").is_some()
}

fn system_role_probe(template: &Template, caps: &Capabilities) -> bool {
    let ctx = probe_context(
        json!([
            {"role": "system", "content": SYSTEM_SENTINEL},
            {"role": "user", "content": USER_TEXT},
        ]),
        json!([]),
    );
    renders_with(template, caps, ctx, "system_role", &[SYSTEM_SENTINEL])
}

fn tool_definition(name: &str) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": "Probe tool",
            "parameters": {
                "type": "object",
                "properties": {"arg": {"type": "string", "description": "Argument"}},
                "required": ["arg"]
            }
        }
    })
}

fn tool_call(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "function",
        "function": {"name": name, "arguments": {"arg": "value"}}
    })
}

fn tools_probe(template: &Template, caps: &Capabilities) -> bool {
    let ctx = probe_context(
        json!([{"role": "user", "content": USER_TEXT}]),
        json!([tool_definition(TOOL_SENTINEL)]),
    );
    renders_with(template, caps, ctx, "tools", &[TOOL_SENTINEL])
}

fn tool_calls_conversation(calls: &[(&str, &str)]) -> serde_json::Value {
    let mut messages = vec![
        json!({"role": "user", "content": USER_TEXT}),
        json!({
            "role": "assistant",
            "content": "",
            "tool_calls": calls.iter().map(|(id, name)| tool_call(id, name)).collect::<Vec<_>>(),
        }),
    ];
    for (id, name) in calls {
        messages.push(json!({
            "role": "tool",
            "tool_call_id": id,
            "name": name,
            "content": "result",
        }));
    }
    serde_json::Value::Array(messages)
}

fn tool_calls_probe(template: &Template, caps: &Capabilities) -> bool {
    let tools = json!([tool_definition(CALL_SENTINEL)]);
    let ctx = probe_context(tool_calls_conversation(&[("call_1", CALL_SENTINEL)]), tools);
    renders_with(template, caps, ctx, "tool_calls", &[CALL_SENTINEL])
}

fn parallel_tool_calls_probe(template: &Template, caps: &Capabilities) -> bool {
    let tools = json!([
        tool_definition(CALL_SENTINEL),
        tool_definition(SECOND_CALL_SENTINEL)
    ]);
    let ctx = probe_context(
        tool_calls_conversation(&[("call_1", CALL_SENTINEL), ("call_2", SECOND_CALL_SENTINEL)]),
        tools,
    );
    renders_with(
        template,
        caps,
        ctx,
        "parallel_tool_calls",
        &[CALL_SENTINEL, SECOND_CALL_SENTINEL],
    )
}

/// Determine a template's capabilities by rendering synthetic conversations.
pub fn probe(template: &Template) -> Capabilities {
    let mut caps = Capabilities::default();

    if string_content_probe(template) {
        caps.requires_typed_content = true;
    }
    if !typed_content_probe(template) {
        caps.supports_typed_content = false;
    }
    caps.supports_system_role = system_role_probe(template, &caps);
    caps.supports_tools = tools_probe(template, &caps);
    caps.supports_tool_calls = tool_calls_probe(template, &caps);
    caps.supports_parallel_tool_calls =
        caps.supports_tool_calls && parallel_tool_calls_probe(template, &caps);

    tracing::debug!(?caps, "probed template capabilities");
    caps
}
