//! The recipe model: a validated, ordered list of step records plus an
//! optional `env_vars` declaration. A recipe can be loaded from a file path,
//! raw JSON text, or an already-decoded value, with file detection
//! preceding parse.

use crate::error::ExecutorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Recipe {
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub env_vars: Vec<String>,
}

/// The three shapes the Executor accepts for a recipe.
pub enum RecipeInput {
    /// Either a filesystem path to a JSON file, or raw JSON text. Which one
    /// it is gets decided by whether the string names an existing regular
    /// file.
    Text(String),
    /// An already-decoded value (e.g. a transient `{ steps: [...] }` body
    /// built by a control-flow step).
    Value(Value),
}

impl From<Vec<StepRecord>> for Recipe {
    fn from(steps: Vec<StepRecord>) -> Self {
        Recipe {
            steps,
            env_vars: Vec::new(),
        }
    }
}

impl Recipe {
    pub fn load(input: RecipeInput) -> Result<Self, ExecutorError> {
        let value = match input {
            RecipeInput::Value(v) => v,
            RecipeInput::Text(s) => {
                let text = if Path::new(&s).is_file() {
                    std::fs::read_to_string(&s)?
                } else {
                    s
                };
                serde_json::from_str(&text)
                    .map_err(|e| ExecutorError::RecipeFormat(format!("invalid JSON: {e}")))?
            }
        };
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ExecutorError> {
        validate(&value)?;
        serde_json::from_value(value)
            .map_err(|e| ExecutorError::RecipeFormat(format!("invalid recipe shape: {e}")))
    }
}

fn validate(value: &Value) -> Result<(), ExecutorError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ExecutorError::RecipeFormat("recipe must be a JSON object".into()))?;

    let steps = obj
        .get("steps")
        .ok_or_else(|| ExecutorError::RecipeFormat("recipe is missing required `steps` field".into()))?;
    let steps = steps
        .as_array()
        .ok_or_else(|| ExecutorError::RecipeFormat("`steps` must be an array".into()))?;

    for (i, step) in steps.iter().enumerate() {
        let step_obj = step
            .as_object()
            .ok_or_else(|| ExecutorError::RecipeFormat(format!("step {i} must be an object")))?;

        match step_obj.get("type") {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => {
                return Err(ExecutorError::RecipeFormat(format!(
                    "step {i} has an empty `type`"
                )))
            }
            _ => {
                return Err(ExecutorError::RecipeFormat(format!(
                    "step {i} is missing a string `type`"
                )))
            }
        }

        if let Some(config) = step_obj.get("config") {
            if !config.is_object() {
                return Err(ExecutorError::RecipeFormat(format!(
                    "step {i} `config` must be an object"
                )));
            }
        }
    }

    if let Some(env_vars) = obj.get("env_vars") {
        let arr = env_vars
            .as_array()
            .ok_or_else(|| ExecutorError::RecipeFormat("`env_vars` must be an array".into()))?;
        for entry in arr {
            if !entry.is_string() {
                return Err(ExecutorError::RecipeFormat(
                    "`env_vars` entries must be strings".into(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_recipe() {
        let recipe = Recipe::from_value(json!({ "steps": [] })).unwrap();
        assert!(recipe.steps.is_empty());
    }

    #[test]
    fn rejects_missing_steps() {
        let err = Recipe::from_value(json!({})).unwrap_err();
        assert!(matches!(err, ExecutorError::RecipeFormat(_)));
    }

    #[test]
    fn rejects_step_without_type() {
        let err = Recipe::from_value(json!({ "steps": [{ "config": {} }] })).unwrap_err();
        assert!(matches!(err, ExecutorError::RecipeFormat(_)));
    }

    #[test]
    fn loads_from_json_text() {
        let recipe = Recipe::load(RecipeInput::Text(
            r#"{"steps":[{"type":"set_context","config":{"key":"a","value":"b"}}]}"#.to_string(),
        ))
        .unwrap();
        assert_eq!(recipe.steps.len(), 1);
        assert_eq!(recipe.steps[0].step_type, "set_context");
    }
}
