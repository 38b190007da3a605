//! Error taxonomy for the recipe executor.
//!
//! One variant per error kind named in the executor design: recipe parsing,
//! step dispatch, template rendering, condition evaluation and the
//! control-flow steps. Each variant carries enough structured data (step
//! index, step type, source error) to satisfy the "mentions both index and
//! type, preserves cause" invariant mechanically via `#[source]`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("recipe format error: {0}")]
    RecipeFormat(String),

    #[error("step {index} has unknown type '{step_type}'")]
    UnknownStepType { index: usize, step_type: String },

    #[error("step {index} ('{step_type}') failed to initialize: {source}")]
    StepInit {
        index: usize,
        step_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("step {index} ('{step_type}') failed: {source}")]
    StepExec {
        index: usize,
        step_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to render template {text:?}: {source}")]
    TemplateRender {
        text: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to evaluate condition {expr:?}: {source}")]
    ConditionEval {
        expr: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("loop `items` did not resolve to a list or map: {0}")]
    LoopItems(String),

    #[error("sub-recipe not found: {0}")]
    SubRecipeNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
