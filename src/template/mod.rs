//! Liquid-style template rendering against a [`Context`] snapshot.
//!
//! Built on `tera`'s Jinja-family syntax, which already covers the needed
//! surface directly: `{{ var }}`, `{{ var | filter }}` and
//! `{% raw %}...{% endraw %}` blocks.

use crate::context::Context;
use crate::error::ExecutorError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tera::Tera;

/// Renders templates against a [`Context`]. Stateless: a fresh `Tera`
/// instance backs every render, so there's no long-lived template cache to
/// invalidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Render `text` once against `context`.
    pub fn render(&self, text: &str, context: &Context) -> Result<String, ExecutorError> {
        let (masked, raw_blocks) = protect_raw_blocks(text);
        let rendered = render_once(&masked, context)?;
        Ok(restore_raw_blocks(&rendered, &raw_blocks))
    }

    /// Render `text` repeatedly until the output stops changing or no longer
    /// contains live markers, honoring `{% raw %}` blocks across every pass
    /// (content protected by a raw block on the first pass stays literal on
    /// every later pass too, even though the wrapping tags are stripped).
    pub fn render_recursive(&self, text: &str, context: &Context) -> Result<String, ExecutorError> {
        let (masked, raw_blocks) = protect_raw_blocks(text);
        let mut current = masked;
        loop {
            let rendered = render_once(&current, context)?;
            let changed = rendered != current;
            let live = contains_live_markers(&rendered);
            current = rendered;
            if !changed || !live {
                break;
            }
        }
        Ok(restore_raw_blocks(&current, &raw_blocks))
    }
}

fn contains_live_markers(text: &str) -> bool {
    text.contains("{{") || text.contains("{%")
}

static RAW_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{%-?\s*raw\s*-?%\}(.*?)\{%-?\s*endraw\s*-?%\}").unwrap());

/// Private-use-area sentinel: guaranteed never to collide with real template
/// text and never to contain `{{`/`{%`, so it survives a `tera` render pass
/// untouched and is invisible to `contains_live_markers`.
const PLACEHOLDER_MARK: char = '\u{E000}';

fn protect_raw_blocks(text: &str) -> (String, Vec<String>) {
    let mut blocks = Vec::new();
    let masked = RAW_BLOCK_RE.replace_all(text, |caps: &regex::Captures| {
        blocks.push(caps[1].to_string());
        format!("{PLACEHOLDER_MARK}{}{PLACEHOLDER_MARK}", blocks.len() - 1)
    });
    (masked.into_owned(), blocks)
}

fn restore_raw_blocks(text: &str, blocks: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != PLACEHOLDER_MARK {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d == PLACEHOLDER_MARK {
                break;
            }
            digits.push(d);
            chars.next();
        }
        chars.next(); // consume closing mark
        match digits.parse::<usize>().ok().and_then(|i| blocks.get(i)) {
            Some(content) => out.push_str(content),
            None => out.push_str(&digits),
        }
    }
    out
}

fn json_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = serde_json::to_string(value)
        .map_err(|e| tera::Error::msg(format!("json filter: {e}")))?;
    Ok(Value::String(text))
}

fn snakecase_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("snakecase filter expects a string"))?;
    Ok(Value::String(to_snake_case(s)))
}

fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut underscored = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' || c == '-' {
            underscored.push('_');
            continue;
        }
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                if prev.is_lowercase() || prev.is_ascii_digit() {
                    underscored.push('_');
                }
            }
            underscored.extend(c.to_lowercase());
            continue;
        }
        underscored.push(c);
    }

    let filtered: String = underscored
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    let mut collapsed = String::with_capacity(filtered.len());
    let mut last_underscore = false;
    for c in filtered.chars() {
        if c == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}|\{%(.*?)%\}").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

const TERA_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "endif", "for", "in", "endfor", "not", "and", "or", "true", "false",
    "loop", "set", "config",
];
const FILTER_NAMES: &[&str] = &["snakecase", "json", "json_encode"];

/// `tera` raises an error the moment a template references a top-level
/// identifier that isn't in the context, but missing variables here should
/// render as empty. Any identifier used as a bare variable inside a
/// `{{ }}`/`{% %}` block that the context doesn't already have gets
/// pre-seeded as `Value::Null` (which `tera` renders as an empty string).
fn missing_identifiers(text: &str, tera_ctx: &tera::Context) -> Vec<String> {
    let mut found = Vec::new();
    for caps in BLOCK_RE.captures_iter(text) {
        let inner = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
        for m in IDENT_RE.find_iter(inner) {
            let word = m.as_str();
            if TERA_KEYWORDS.contains(&word) || FILTER_NAMES.contains(&word) {
                continue;
            }
            let preceded_by_dot = inner[..m.start()].ends_with('.');
            let followed_by_paren = inner[m.end()..].trim_start().starts_with('(');
            if preceded_by_dot || followed_by_paren {
                continue;
            }
            if tera_ctx.get(word).is_none() && !found.contains(&word.to_string()) {
                found.push(word.to_string());
            }
        }
    }
    found
}

fn render_once(text: &str, context: &Context) -> Result<String, ExecutorError> {
    let mut tera = Tera::default();
    tera.register_filter("snakecase", snakecase_filter);
    tera.register_filter("json", json_filter);
    tera.add_raw_template("__recipe_exec__", text)
        .map_err(|e| ExecutorError::TemplateRender {
            text: text.to_string(),
            source: anyhow::anyhow!(e),
        })?;

    let mut tera_ctx = tera::Context::new();
    for (key, value) in context.dict() {
        tera_ctx.insert(key, &value);
    }
    tera_ctx.insert("config", context.config_view().as_map());

    for ident in missing_identifiers(text, &tera_ctx) {
        // An empty string, not `Value::Null`, so a bare `{{ missing }}`
        // reliably renders as nothing regardless of how the engine would
        // otherwise print a null value.
        tera_ctx.insert(ident, &Value::String(String::new()));
    }

    tera.render("__recipe_exec__", &tera_ctx)
        .map_err(|e| ExecutorError::TemplateRender {
            text: text.to_string(),
            source: anyhow::anyhow!(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(pairs: &[(&str, Value)]) -> Context {
        let mut ctx = Context::new();
        for (k, v) in pairs {
            ctx.set(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn plain_text_round_trips() {
        let engine = TemplateEngine::new();
        let ctx = Context::new();
        assert_eq!(engine.render("hello world", &ctx).unwrap(), "hello world");
    }

    #[test]
    fn substitutes_artifact() {
        let engine = TemplateEngine::new();
        let ctx = ctx_with(&[("x", json!("world"))]);
        assert_eq!(engine.render("hello {{x}}", &ctx).unwrap(), "hello world");
    }

    #[test]
    fn missing_variable_renders_empty() {
        let engine = TemplateEngine::new();
        let ctx = Context::new();
        assert_eq!(engine.render("[{{missing}}]", &ctx).unwrap(), "[]");
    }

    #[test]
    fn snakecase_filter_converts_camel_case() {
        let engine = TemplateEngine::new();
        let ctx = ctx_with(&[("name", json!("SomeCamelCase Value-here"))]);
        assert_eq!(
            engine.render("{{ name | snakecase }}", &ctx).unwrap(),
            "some_camel_case_value_here"
        );
    }

    #[test]
    fn config_is_namespaced() {
        let engine = TemplateEngine::new();
        let mut config = HashMap::new();
        config.insert("LEVEL".to_string(), json!(3));
        let ctx = Context::with_config(config);
        assert_eq!(engine.render("{{ config.LEVEL }}", &ctx).unwrap(), "3");
    }

    #[test]
    fn recursive_render_resolves_value_containing_markers() {
        let engine = TemplateEngine::new();
        let ctx = ctx_with(&[("x", json!("{{y}}")), ("y", json!("Z"))]);
        assert_eq!(
            engine.render_recursive("{{x}}", &ctx).unwrap(),
            "Z"
        );
    }

    #[test]
    fn raw_block_survives_recursive_render() {
        let engine = TemplateEngine::new();
        let ctx = ctx_with(&[("x", json!("{{y}}")), ("y", json!("Z"))]);
        let out = engine
            .render_recursive("{% raw %}{{y}}{% endraw %} {{x}}", &ctx)
            .unwrap();
        assert_eq!(out, "{{y}} Z");
    }

    #[test]
    fn non_recursive_render_leaves_nested_markers_literal() {
        let engine = TemplateEngine::new();
        let ctx = ctx_with(&[("x", json!("{{y}}"))]);
        assert_eq!(engine.render("{{x}}", &ctx).unwrap(), "{{y}}");
    }
}
