//! The Executor normalizes a recipe, then dispatches its steps sequentially
//! against a live [`Context`], wrapping every failure with step index and
//! type.

use crate::context::Context;
use crate::error::ExecutorError;
use crate::recipe::{Recipe, RecipeInput};
use crate::registry::{Registry, StepArgs};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Stateless and reusable: holds only a handle to the step registry, never
/// any per-run state, so the same `Executor` can run many recipes.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<Registry>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub async fn execute(&self, input: RecipeInput, context: &mut Context) -> Result<(), ExecutorError> {
        let source = source_kind(&input);
        let recipe = Recipe::load(input)?;
        self.run(&recipe, context, source).await
    }

    /// Run an already-normalized recipe. Used directly by control-flow steps
    /// that build transient `{ steps: [...] }` bodies and don't want to pay
    /// for a second format validation pass.
    pub async fn execute_recipe(&self, recipe: &Recipe, context: &mut Context) -> Result<(), ExecutorError> {
        self.run(recipe, context, "inline").await
    }

    async fn run(&self, recipe: &Recipe, context: &mut Context, source: &str) -> Result<(), ExecutorError> {
        tracing::debug!(source, step_count = recipe.steps.len(), "executing recipe");

        for (index, record) in recipe.steps.iter().enumerate() {
            let config = summarize_config(&record.config);
            tracing::debug!(step = index, step_type = %record.step_type, config = %config, "dispatching step");

            let step = self.registry.build(StepArgs {
                index,
                step_type: record.step_type.clone(),
                config: record.config.clone(),
                registry: Arc::clone(&self.registry),
            })?;

            step.execute(context)
                .await
                .map_err(|source| ExecutorError::StepExec {
                    index,
                    step_type: record.step_type.clone(),
                    source,
                })?;

            tracing::debug!(step = index, step_type = %record.step_type, "step completed");
        }

        Ok(())
    }
}

/// Which of the three accepted recipe shapes a load came from, for the debug
/// log at recipe load.
fn source_kind(input: &RecipeInput) -> &'static str {
    match input {
        RecipeInput::Text(s) if Path::new(s).is_file() => "file",
        RecipeInput::Text(_) => "text",
        RecipeInput::Value(_) => "value",
    }
}

/// A short, single-line summary of a step's config for the per-step debug
/// log: just the sorted field names, not the values, so the log line stays
/// small and doesn't echo step payloads.
fn summarize_config(config: &Value) -> String {
    match config.as_object() {
        Some(obj) if obj.is_empty() => "{}".to_string(),
        Some(obj) => {
            let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            keys.sort_unstable();
            format!("{{{}}}", keys.join(", "))
        }
        None => config.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn runs_empty_recipe() {
        let executor = Executor::new(Arc::new(Registry::with_builtin_steps()));
        let mut context = Context::new();
        executor
            .execute(RecipeInput::Value(json!({ "steps": [] })), &mut context)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_step_type_is_fatal_with_index() {
        let executor = Executor::new(Arc::new(Registry::with_builtin_steps()));
        let mut context = Context::new();
        let err = executor
            .execute(
                RecipeInput::Value(json!({ "steps": [{ "type": "nope", "config": {} }] })),
                &mut context,
            )
            .await
            .unwrap_err();
        match err {
            ExecutorError::UnknownStepType { index, step_type } => {
                assert_eq!(index, 0);
                assert_eq!(step_type, "nope");
            }
            other => panic!("expected UnknownStepType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_context_writes_an_artifact() {
        let executor = Executor::new(Arc::new(Registry::with_builtin_steps()));
        let mut context = Context::new();
        executor
            .execute(
                RecipeInput::Value(json!({
                    "steps": [
                        { "type": "set_context", "config": { "key": "greeting", "value": "hi" } }
                    ]
                })),
                &mut context,
            )
            .await
            .unwrap();
        assert_eq!(context.get("greeting"), Some(&json!("hi")));
    }
}
