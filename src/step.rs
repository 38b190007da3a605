//! The step contract: every step type, control-flow or leaf, implements this
//! trait as a typed, single-use value constructed from raw config and run
//! once via an async `execute`.

use crate::context::Context;
use async_trait::async_trait;

/// A single, single-use unit of work. Instances are constructed from a raw
/// config map immediately before `execute` and discarded afterward.
///
/// Steps raise plain `anyhow::Error` on failure. The Executor is the one
/// place that wraps a failure into the typed `StepExecError` (index, type,
/// cause).
#[async_trait]
pub trait Step: Send + Sync {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()>;
}
