/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end rendering tests through the public API.
 */

use chat_template::{Context, EngineConfig, ErrorKind, Template, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn render(source: &str, data: serde_json::Value) -> String {
    Template::compile(source)
        .unwrap_or_else(|e| panic!("failed to compile {:?}: {}", source, e))
        .render_json(&data)
        .unwrap_or_else(|e| panic!("failed to render {:?}: {}", source, e))
}

// ============================================================================
// Basic scenarios
// ============================================================================

#[test]
fn test_if_else() {
    let source = "{% if cond %}yes{% else %}no{% endif %}";
    assert_eq!(render(source, json!({"cond": true})), "yes");
    assert_eq!(render(source, json!({"cond": false})), "no");
}

#[test]
fn test_loop_index() {
    let source = "{% for i in items %}{{ loop.index }}{% endfor %}";
    assert_eq!(render(source, json!({"items": [10, 20, 30]})), "123");
}

#[test]
fn test_title_filter() {
    assert_eq!(render("{{ 'hello world' | title }}", json!({})), "Hello World");
}

#[test]
fn test_namespace_counter() {
    let source = "{% set ns = namespace(count=0) %}{% for i in range(3) %}{% set ns.count = ns.count + 1 %}{% endfor %}{{ ns.count }}";
    assert_eq!(render(source, json!({})), "3");
}

#[test]
fn test_raise_exception_keeps_message() {
    let source = "{% if messages[0]['role'] == 'system' %}{{ raise_exception('System role not supported') }}{% endif %}";
    let template = Template::compile(source).unwrap();
    let err = template
        .render_json(&json!({"messages": [{"role": "system", "content": "x"}]}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Raised);
    assert_eq!(err.raised_message(), Some("System role not supported"));

    let ok = template.render_json(&json!({"messages": [{"role": "user", "content": "x"}]}));
    assert_eq!(ok.unwrap(), "");
}

#[test]
fn test_tojson_indent() {
    let out = render(
        "{{ data | tojson(indent=2) }}",
        json!({"data": {"a": 1, "b": [1, 2]}}),
    );
    insta::assert_snapshot!(out, @r#"
    {
      "a": 1,
      "b": [
        1,
        2
      ]
    }
    "#);
}

// ============================================================================
// Whitespace control
// ============================================================================

#[test]
fn test_no_whitespace_control() {
    assert_eq!(render("    {% if true %}\n    {% endif %}", json!({})), "    \n    ");
    assert_eq!(
        render(
            "  {% if kvs %}   {% for k, v in kvs %}{{ k }}={{ v }} {% endfor %}  {% endif %}",
            json!({"kvs": {"a": 1, "b": 2}}),
        ),
        "     a=1 b=2   "
    );
}

#[test]
fn test_leading_whitespace_control() {
    assert_eq!(
        render(
            "  {%- if kvs %}   {%- for k, v in kvs %}{{ k }}={{ v }} {% endfor -%}  {%- endif %}",
            json!({"kvs": {"a": 1, "b": 2}}),
        ),
        "a=1 b=2 "
    );
    assert_eq!(
        render(
            "{{- ']~b[ai' ~ '\\n' }}\n\n{%- set reasoning_content = ''%}",
            json!({})
        ),
        "]~b[ai\n"
    );
}

#[test]
fn test_trim_and_lstrip_blocks() {
    let source = "<ul>\n    {% for x in xs %}\n    <li>{{ x }}</li>\n    {% endfor %}\n</ul>\n";
    let template = Template::compile_with_options(source, &EngineConfig::chat()).unwrap();
    let out = template.render_json(&json!({"xs": [1, 2]})).unwrap();
    assert_eq!(out, "<ul>\n    <li>1</li>\n    <li>2</li>\n</ul>");
}

#[test]
fn test_generation_markers_are_ignored() {
    let source = "{% generation %}{{ 'x' }}{% endgeneration %}";
    assert_eq!(render(source, json!({})), "x");
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_text_without_tags_is_unchanged() {
    for text in ["plain", "two\nlines", "tabs\tand  spaces", "unicode: é ✓ 😀"] {
        assert_eq!(render(text, json!({})), text);
        assert_eq!(render(&format!("{text}\n"), json!({})), text);
    }
    assert_eq!(render("keeps one\n\n", json!({})), "keeps one\n");
}

#[test]
fn test_tojson_round_trip() {
    let data = json!({"z": 1, "a": [true, null, 2.5, "s\"q"], "m": {"k": "v"}});
    let once = render("{{ data | tojson }}", json!({"data": data.clone()}));
    let parsed: serde_json::Value = serde_json::from_str(&once).unwrap();
    assert_eq!(parsed, data);

    let keys: Vec<&String> = parsed.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["z", "a", "m"]);

    let twice = render("{{ data | tojson }}", json!({"data": parsed}));
    assert_eq!(twice, once);
}

#[test]
fn test_provenance_of_concatenation() {
    let template = Template::compile("{{ a ~ b }}").unwrap();

    let mut ctx = Context::new();
    ctx.set_json_input("a", &json!("user "));
    ctx.set_json_input("b", &json!("text"));
    assert!(template.render_parts(&ctx).unwrap().is_input());

    ctx.set("b", Value::string("template"));
    let out = template.render_parts(&ctx).unwrap();
    assert!(!out.is_input());
    assert_eq!(out.to_string(), "user template");
}

#[test]
fn test_aliasing() {
    let shared = "{% set a = {'n': 1} %}{% set b = a %}{% set b.n = 2 %}{{ a.n }}";
    assert_eq!(render(shared, json!({})), "2");

    let caller_data = "{% set _ = items.append(4) %}{{ items | length }}";
    let mut ctx = Context::new();
    ctx.set_json("items", &json!([1, 2, 3]));
    let template = Template::compile(caller_data).unwrap();
    assert_eq!(template.render(&ctx).unwrap(), "4");
    assert_eq!(ctx.get("items").unwrap().to_string(), "[1, 2, 3, 4]");

    let copied = "{% set a = [1] %}{% set b = a | list %}{% set _ = b.append(2) %}{{ a }}";
    assert_eq!(render(copied, json!({})), "[1]");
}

#[test]
fn test_filtered_loop_length() {
    let source = "{% for m in messages if m.role != 'system' %}{{ loop.index }}/{{ loop.length }}{% if loop.last %}!{% endif %} {% endfor %}";
    let data = json!({"messages": [
        {"role": "system"}, {"role": "user"}, {"role": "assistant"}, {"role": "system"}, {"role": "user"}
    ]});
    assert_eq!(render(source, data), "1/3 2/3 3/3! ");
}

#[test]
fn test_slices_and_indexes() {
    let data = json!({"xs": [1, 2, 3], "s": "abc"});
    assert_eq!(render("{{ xs[1:100] }} {{ xs[-100:1] }} {{ xs[::-2] }}", data.clone()), "[2, 3] [1] [3, 1]");
    assert_eq!(render("{{ s[5:] }}|{{ s[-2:] }}", data.clone()), "|bc");
    assert_eq!(render("[{{ xs[10] }}][{{ s[-10] }}]", data.clone()), "[][]");

    let err = Template::compile("{{ xs[::0] }}").unwrap().render_json(&data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.to_string().contains("slice step cannot be zero"));

    assert_eq!(render("{{ [1, 2, 3][1::9223372036854775807] }}", json!({})), "[2]");
    assert_eq!(render("{{ 'abc'[::-9223372036854775807] }}", json!({})), "c");
    assert_eq!(
        render("{{ range(9223372036854775806, 9223372036854775807, 5) | list }}", json!({})),
        "[9223372036854775806]"
    );
}

#[test]
fn test_signed_float_literals() {
    assert_eq!(render("{{ -1.5 }} {{ +2.25 }}", json!({})), "-1.5 2.25");
    assert_eq!(render("{{ x * -0.5 }}", json!({"x": 3})), "-1.5");
}

#[test]
fn test_string_number_comparison() {
    assert_eq!(render("{{ '1' == 1 }} {{ '10' < 9 }} {{ 2 > '1' }}", json!({})), "True True True");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_kinds() {
    let lex = Template::compile("{{ 'unterminated }}").unwrap_err();
    assert_eq!(lex.kind(), ErrorKind::Lex);

    let parse = Template::compile("{% for x in %}{% endfor %}").unwrap_err();
    assert_eq!(parse.kind(), ErrorKind::Parse);

    let template = Template::compile("{{ 1 + 'a' }}").unwrap();
    assert_eq!(template.render(&Context::new()).unwrap_err().kind(), ErrorKind::Type);

    let template = Template::compile("{{ 'a b' | wordwrap(1) }}").unwrap();
    assert_eq!(
        template.render(&Context::new()).unwrap_err().kind(),
        ErrorKind::NotImplemented
    );
}

#[test]
fn test_runtime_error_snippet() {
    let template = Template::compile("Hello\n{{ user.name.first }}").unwrap();
    let err = template.render_json(&json!({})).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("MemberExpression at byte 9"), "{}", message);
    assert!(message.contains("{{ user.name.first }}"), "{}", message);
}

// ============================================================================
// Clock
// ============================================================================

#[test]
fn test_strftime_now_uses_context_clock() {
    use chrono::{Local, TimeZone};

    let now = Local.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap();
    let ctx = Context::with_clock(now);
    let template = Template::compile("{{ strftime_now('%d %b %Y') }}").unwrap();
    assert_eq!(template.render(&ctx).unwrap(), "01 Jul 2024");
}
