//! `execute_recipe`: render a sub-recipe path and context overrides, apply
//! the overrides to the live context, then invoke the Executor on the
//! sub-recipe with that same live context so outputs propagate outward.

use crate::context::Context;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::recipe::RecipeInput;
use crate::registry::{Registry, StepArgs};
use crate::step::Step;
use crate::template::TemplateEngine;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub struct ExecuteRecipeStep {
    recipe_path: String,
    context_overrides: Map<String, Value>,
    registry: Arc<Registry>,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;
    let recipe_path = cfg
        .get("recipe_path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("execute_recipe requires a string `recipe_path`"))?
        .to_string();
    let context_overrides = cfg
        .get("context_overrides")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(Box::new(ExecuteRecipeStep {
        recipe_path,
        context_overrides,
        registry: args.registry,
    }))
}

/// Render a leaf nested inside a `context_overrides` value: string leaves
/// are rendered; everything else passes through unchanged.
fn render_leaf(engine: &TemplateEngine, value: &Value, context: &Context) -> anyhow::Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(engine.render(s, context)?)),
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| render_leaf(engine, v, context))
                .collect::<anyhow::Result<Vec<_>>>()?,
        )),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), render_leaf(engine, v, context)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// A top-level override value gets one extra chance: after rendering, if the
/// string parses as a JSON object or an array of objects, store the parsed
/// structure instead of the literal rendered text. This lets overrides pass
/// structured data through a string-templated format.
fn render_override(engine: &TemplateEngine, value: &Value, context: &Context) -> anyhow::Result<Value> {
    match value {
        Value::String(s) => {
            let rendered = engine.render(s, context)?;
            match serde_json::from_str::<Value>(&rendered) {
                Ok(parsed @ Value::Object(_)) => Ok(parsed),
                Ok(Value::Array(items)) if !items.is_empty() && items.iter().all(Value::is_object) => {
                    Ok(Value::Array(items))
                }
                _ => Ok(Value::String(rendered)),
            }
        }
        other => render_leaf(engine, other, context),
    }
}

#[async_trait]
impl Step for ExecuteRecipeStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        let engine = TemplateEngine::new();
        let path = engine.render(&self.recipe_path, context)?;

        for (key, value) in &self.context_overrides {
            let rendered = render_override(&engine, value, context)?;
            context.set(key.clone(), rendered);
        }

        if !Path::new(&path).is_file() {
            return Err(ExecutorError::SubRecipeNotFound(path).into());
        }

        let executor = Executor::new(Arc::clone(&self.registry));
        executor.execute(RecipeInput::Text(path), context).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(config: Value) -> StepArgs {
        StepArgs {
            index: 0,
            step_type: "execute_recipe".to_string(),
            config,
            registry: Arc::new(Registry::with_builtin_steps()),
        }
    }

    #[tokio::test]
    async fn missing_recipe_file_is_reported() {
        let mut context = Context::new();
        let step = build(args(json!({ "recipe_path": "/nonexistent/recipe.json" }))).unwrap();
        let err = step.execute(&mut context).await.unwrap_err();
        assert!(err.downcast_ref::<ExecutorError>().is_some());
    }

    #[tokio::test]
    async fn override_string_parses_structured_json() {
        let engine = TemplateEngine::new();
        let context = Context::new();
        let rendered = render_override(&engine, &json!("{\"a\": 1}"), &context).unwrap();
        assert_eq!(rendered, json!({"a": 1}));
    }

    #[tokio::test]
    async fn override_plain_string_stays_a_string() {
        let engine = TemplateEngine::new();
        let context = Context::new();
        let rendered = render_override(&engine, &json!("just text"), &context).unwrap();
        assert_eq!(rendered, json!("just text"));
    }
}
