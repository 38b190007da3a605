//! `conditional`: render a condition, evaluate it (directly if already
//! boolean, otherwise as a restricted expression), and run the selected
//! branch as a transient sub-recipe.

use crate::context::Context;
use crate::executor::Executor;
use crate::recipe::{Recipe, StepRecord};
use crate::registry::{Registry, StepArgs};
use crate::step::Step;
use crate::steps::expression;
use crate::template::TemplateEngine;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct ConditionalStep {
    condition: Value,
    if_true: Option<Vec<StepRecord>>,
    if_false: Option<Vec<StepRecord>>,
    registry: Arc<Registry>,
}

fn parse_branch(value: Option<&Value>) -> anyhow::Result<Option<Vec<StepRecord>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let steps = value
        .get("steps")
        .ok_or_else(|| anyhow::anyhow!("conditional branch must have a `steps` array"))?;
    let records: Vec<StepRecord> = serde_json::from_value(steps.clone())?;
    Ok(Some(records))
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;
    let condition = cfg
        .get("condition")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("conditional requires a `condition`"))?;
    let if_true = parse_branch(cfg.get("if_true"))?;
    let if_false = parse_branch(cfg.get("if_false"))?;

    Ok(Box::new(ConditionalStep {
        condition,
        if_true,
        if_false,
        registry: args.registry,
    }))
}

#[async_trait]
impl Step for ConditionalStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        let outcome = match &self.condition {
            Value::Bool(b) => *b,
            Value::String(s) => {
                let engine = TemplateEngine::new();
                let rendered = engine.render(s, context)?;
                expression::evaluate(&rendered, context)?
            }
            other => expression::truthy(other),
        };

        let branch = if outcome { &self.if_true } else { &self.if_false };
        if let Some(steps) = branch {
            let recipe: Recipe = steps.clone().into();
            let executor = Executor::new(Arc::clone(&self.registry));
            executor.execute_recipe(&recipe, context).await?;
        }
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
            step_type: "conditional".to_string(),
            config,
            registry: Arc::new(Registry::with_builtin_steps()),
        }
    }

    #[tokio::test]
    async fn boolean_condition_picks_branch() {
        let mut context = Context::new();
        let step = build(args(json!({
            "condition": true,
            "if_true": { "steps": [{ "type": "set_context", "config": { "key": "ran", "value": "yes" } }] }
        })))
        .unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("ran"), Some(&json!("yes")));
    }

    #[tokio::test]
    async fn expression_condition_evaluates_against_context() {
        let mut context = Context::new();
        context.set("n", json!(5));
        let step = build(args(json!({
            "condition": "{{n}} > 0",
            "if_true": { "steps": [{ "type": "set_context", "config": { "key": "sign", "value": "positive" } }] },
            "if_false": { "steps": [{ "type": "set_context", "config": { "key": "sign", "value": "non-positive" } }] }
        })))
        .unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("sign"), Some(&json!("positive")));
    }

    #[tokio::test]
    async fn missing_branch_is_a_no_op() {
        let mut context = Context::new();
        let step = build(args(json!({ "condition": false }))).unwrap();
        step.execute(&mut context).await.unwrap();
    }
}
