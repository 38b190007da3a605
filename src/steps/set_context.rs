//! `set_context`: assign or type-aware-merge a value into the live context,
//! with optional recursive template expansion.

use crate::context::Context;
use crate::registry::StepArgs;
use crate::step::Step;
use crate::template::TemplateEngine;
use async_trait::async_trait;
use serde_json::{Map, Value};

enum IfExists {
    Overwrite,
    Merge,
}

pub struct SetContextStep {
    key: String,
    value: Value,
    nested_render: bool,
    if_exists: IfExists,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;
    let key = cfg
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("set_context requires a string `key`"))?
        .to_string();
    let value = cfg
        .get("value")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("set_context requires a `value`"))?;
    let nested_render = cfg
        .get("nested_render")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let if_exists = match cfg.get("if_exists").and_then(Value::as_str) {
        None | Some("overwrite") => IfExists::Overwrite,
        Some("merge") => IfExists::Merge,
        Some(other) => anyhow::bail!("set_context: unknown if_exists '{other}'"),
    };

    Ok(Box::new(SetContextStep {
        key,
        value,
        nested_render,
        if_exists,
    }))
}

fn render_value(
    engine: &TemplateEngine,
    value: &Value,
    context: &Context,
    nested: bool,
) -> anyhow::Result<Value> {
    match value {
        Value::String(s) => {
            let rendered = if nested {
                engine.render_recursive(s, context)?
            } else {
                engine.render(s, context)?
            };
            Ok(Value::String(rendered))
        }
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|v| render_value(engine, v, context, nested))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), render_value(engine, v, context, nested)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn merge_values(old: Value, new: Value) -> Value {
    match (old, new) {
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Value::String(a)
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Value::Array(a)
        }
        (Value::Array(mut a), item) => {
            a.push(item);
            Value::Array(a)
        }
        (Value::Object(mut a), Value::Object(b)) => {
            for (k, v) in b {
                a.insert(k, v);
            }
            Value::Object(a)
        }
        (old, new) => Value::Array(vec![old, new]),
    }
}

#[async_trait]
impl Step for SetContextStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        let engine = TemplateEngine::new();
        let rendered = render_value(&engine, &self.value, context, self.nested_render)?;

        let merged = match self.if_exists {
            IfExists::Overwrite => rendered,
            IfExists::Merge => match context.get(&self.key) {
                Some(existing) => merge_values(existing.clone(), rendered),
                None => rendered,
            },
        };

        context.set(self.key.clone(), merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;
    use std::sync::Arc;

    fn args(config: Value) -> StepArgs {
        StepArgs {
            index: 0,
            step_type: "set_context".to_string(),
            config,
            registry: Arc::new(Registry::new()),
        }
    }

    #[tokio::test]
    async fn overwrite_renders_template() {
        let mut context = Context::new();
        context.set("name", json!("world"));
        let step = build(args(json!({ "key": "greeting", "value": "hi {{name}}" }))).unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("greeting"), Some(&json!("hi world")));
    }

    #[tokio::test]
    async fn merge_appends_lists() {
        let mut context = Context::new();
        context.set("tags", json!(["a"]));
        let step = build(args(
            json!({ "key": "tags", "value": ["b"], "if_exists": "merge" }),
        ))
        .unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("tags"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn merge_type_mismatch_produces_pair() {
        let mut context = Context::new();
        context.set("x", json!("a"));
        let step = build(args(json!({ "key": "x", "value": 1, "if_exists": "merge" }))).unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("x"), Some(&json!(["a", 1])));
    }
}
