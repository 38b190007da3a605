//! `loop`: bounded-concurrency iteration over a list or map, with
//! per-iteration cloned contexts and ordered result aggregation. Each
//! iteration runs a transient sub-recipe over its own context clone, fanned
//! out through an `Arc<Semaphore>` and `futures::join_all`, with an optional
//! `fail_fast=false` mode that collects per-iteration errors into
//! `__errors` instead of aborting the whole loop.

use crate::context::Context;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::recipe::{Recipe, StepRecord};
use crate::registry::{Registry, StepArgs};
use crate::step::Step;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
enum ItemKey {
    Index(usize),
    Key(String),
}

impl ItemKey {
    fn binding_value(&self) -> Value {
        match self {
            ItemKey::Index(i) => json!(*i),
            ItemKey::Key(k) => json!(k),
        }
    }

    fn as_string(&self) -> String {
        match self {
            ItemKey::Index(i) => i.to_string(),
            ItemKey::Key(k) => k.clone(),
        }
    }
}

pub struct LoopStep {
    items: Value,
    item_key: String,
    substeps: Vec<StepRecord>,
    result_key: String,
    max_concurrency: usize,
    delay: f64,
    fail_fast: bool,
    registry: Arc<Registry>,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;
    let items = cfg
        .get("items")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("loop requires `items`"))?;
    let item_key = cfg
        .get("item_key")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("loop requires a string `item_key`"))?
        .to_string();
    let substeps: Vec<StepRecord> = serde_json::from_value(
        cfg.get("substeps")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("loop requires a `substeps` array"))?,
    )?;
    let result_key = cfg
        .get("result_key")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("loop requires a string `result_key`"))?
        .to_string();
    let max_concurrency = cfg
        .get("max_concurrency")
        .and_then(Value::as_u64)
        .unwrap_or(1) as usize;
    let delay = cfg.get("delay").and_then(Value::as_f64).unwrap_or(0.0);
    let fail_fast = cfg.get("fail_fast").and_then(Value::as_bool).unwrap_or(true);

    Ok(Box::new(LoopStep {
        items,
        item_key,
        substeps,
        result_key,
        max_concurrency,
        delay,
        fail_fast,
        registry: args.registry,
    }))
}

#[async_trait]
impl Step for LoopStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        let resolved = match &self.items {
            Value::String(path) => context
                .resolve_path(path)
                .ok_or_else(|| ExecutorError::LoopItems(format!("path '{path}' did not resolve")))?,
            other => other.clone(),
        };

        let is_list = matches!(resolved, Value::Array(_));
        let entries: Vec<(ItemKey, Value)> = match resolved {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (ItemKey::Index(i), v))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (ItemKey::Key(k), v))
                .collect(),
            other => {
                return Err(ExecutorError::LoopItems(format!(
                    "`items` resolved to {other:?}, expected a list or map"
                ))
                .into())
            }
        };

        if entries.is_empty() {
            context.set(
                self.result_key.clone(),
                if is_list {
                    Value::Array(Vec::new())
                } else {
                    Value::Object(Map::new())
                },
            );
            return Ok(());
        }

        let permits = if self.max_concurrency == 0 {
            entries.len()
        } else {
            self.max_concurrency
        };
        let semaphore = Arc::new(Semaphore::new(permits.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));

        let tasks = entries.into_iter().enumerate().map(|(index, (key, value))| {
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            let registry = Arc::clone(&self.registry);
            let mut iter_context = context.deep_clone();
            let item_key = self.item_key.clone();
            let substeps = self.substeps.clone();
            let delay = self.delay;
            let fail_fast = self.fail_fast;
            let key_for_binding = key.clone();

            async move {
                if delay > 0.0 {
                    tokio::time::sleep(std::time::Duration::from_secs_f64(delay * index as f64)).await;
                }
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if fail_fast && cancelled.load(Ordering::SeqCst) {
                    return (key, Err(anyhow::anyhow!("iteration cancelled after a prior failure")));
                }

                iter_context.set(item_key.clone(), value);
                iter_context.set("__key", key_for_binding.binding_value());

                let recipe: Recipe = substeps.into();
                let executor = Executor::new(registry);
                let outcome = executor.execute_recipe(&recipe, &mut iter_context).await;

                match outcome {
                    Ok(()) => {
                        let result_value = iter_context.get(&item_key).cloned().unwrap_or(Value::Null);
                        (key, Ok(result_value))
                    }
                    Err(e) => {
                        if fail_fast {
                            cancelled.store(true, Ordering::SeqCst);
                        }
                        (key, Err(anyhow::Error::new(e)))
                    }
                }
            }
        });

        let outcomes: Vec<(ItemKey, Result<Value, anyhow::Error>)> =
            futures::future::join_all(tasks).await;

        if self.fail_fast {
            for (key, outcome) in &outcomes {
                if let Err(e) = outcome {
                    anyhow::bail!("loop iteration '{}' failed: {e}", key.as_string());
                }
            }
        }

        let mut errors = Vec::new();
        if is_list {
            let mut result_list = Vec::with_capacity(outcomes.len());
            for (key, outcome) in outcomes {
                match outcome {
                    Ok(value) => result_list.push(value),
                    Err(e) => errors.push(json!({ "key": key.as_string(), "error": e.to_string() })),
                }
            }
            context.set(self.result_key.clone(), Value::Array(result_list));
        } else {
            let mut result_map = Map::new();
            for (key, outcome) in outcomes {
                let key_str = key.as_string();
                match outcome {
                    Ok(value) => {
                        result_map.insert(key_str, value);
                    }
                    Err(e) => errors.push(json!({ "key": key_str, "error": e.to_string() })),
                }
            }
            context.set(self.result_key.clone(), Value::Object(result_map));
        }

        if !errors.is_empty() {
            context.set("__errors", Value::Array(errors));
        }

        Ok(())
    }
}
