//! `parallel`: run a fixed list of heterogeneous substeps concurrently over
//! cloned contexts, with bounded concurrency and fail-fast cancellation.
//! Shares the `Semaphore` + `join_all` fan-out pattern used by `loop`,
//! without the aggregation step. Substeps here communicate only through
//! external side effects, never back into the live context.

use crate::context::Context;
use crate::recipe::StepRecord;
use crate::registry::{Registry, StepArgs};
use crate::step::Step;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct ParallelStep {
    substeps: Vec<StepRecord>,
    max_concurrency: usize,
    delay: f64,
    registry: Arc<Registry>,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;
    let substeps: Vec<StepRecord> = serde_json::from_value(
        cfg.get("substeps")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("parallel requires a `substeps` array"))?,
    )?;
    let max_concurrency = cfg
        .get("max_concurrency")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let delay = cfg.get("delay").and_then(Value::as_f64).unwrap_or(0.0);

    Ok(Box::new(ParallelStep {
        substeps,
        max_concurrency,
        delay,
        registry: args.registry,
    }))
}

#[async_trait]
impl Step for ParallelStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        if self.substeps.is_empty() {
            return Ok(());
        }

        let permits = if self.max_concurrency == 0 {
            self.substeps.len()
        } else {
            self.max_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(permits.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));

        let tasks = self.substeps.iter().cloned().enumerate().map(|(index, record)| {
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            let registry = Arc::clone(&self.registry);
            let mut substep_context = context.deep_clone();
            let delay = self.delay;

            async move {
                if delay > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(delay * index as f64)).await;
                }
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if cancelled.load(Ordering::SeqCst) {
                    anyhow::bail!("substep {index} cancelled after a prior failure");
                }

                let step_type = record.step_type.clone();
                let step = registry.build(StepArgs {
                    index,
                    step_type: step_type.clone(),
                    config: record.config.clone(),
                    registry: Arc::clone(&registry),
                })?;

                let result = step.execute(&mut substep_context).await;
                if result.is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                result.map_err(|e| anyhow::anyhow!("substep {index} ('{step_type}') failed: {e}"))
            }
        });

        for outcome in futures::future::join_all(tasks).await {
            outcome?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use serde_json::json;

    fn args(config: Value) -> StepArgs {
        StepArgs {
            index: 0,
            step_type: "parallel".to_string(),
            config,
            registry: Arc::new(Registry::with_builtin_steps()),
        }
    }

    #[tokio::test]
    async fn substeps_do_not_leak_into_live_context() {
        let mut context = Context::new();
        context.set("shared", json!("untouched"));
        let step = build(args(json!({
            "substeps": [
                { "type": "set_context", "config": { "key": "shared", "value": "mutated-a" } },
                { "type": "set_context", "config": { "key": "shared", "value": "mutated-b" } }
            ]
        })))
        .unwrap();
        step.execute(&mut context).await.unwrap();
        assert_eq!(context.get("shared"), Some(&json!("untouched")));
    }

    #[tokio::test]
    async fn first_failure_propagates() {
        let mut context = Context::new();
        let step = build(args(json!({
            "substeps": [
                { "type": "execute_recipe", "config": { "recipe_path": "/nonexistent.json" } }
            ]
        })))
        .unwrap();
        assert!(step.execute(&mut context).await.is_err());
    }
}
