//! The step registry: a process-wide mapping from step-type name to step
//! constructor, populated once at startup. A flat `HashMap<String, _>`
//! lookup keyed by step type, backed by a pluggable constructor table
//! rather than a closed enum, since the recipe format allows registering
//! arbitrary step types at runtime.

use crate::error::ExecutorError;
use crate::step::Step;
use crate::steps;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a step constructor needs besides its own raw config: its
/// position in the enclosing recipe (for error context) and a handle back
/// to the registry, so control-flow steps (`execute_recipe`, `conditional`,
/// `loop`, `parallel`) can build child executors over the same step set.
pub struct StepArgs {
    pub index: usize,
    pub step_type: String,
    pub config: Value,
    pub registry: Arc<Registry>,
}

pub type StepCtor = Arc<dyn Fn(StepArgs) -> anyhow::Result<Box<dyn Step>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Registry {
    ctors: HashMap<String, StepCtor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_type: impl Into<String>, ctor: StepCtor) {
        self.ctors.insert(step_type.into(), ctor);
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.ctors.contains_key(step_type)
    }

    pub fn build(&self, args: StepArgs) -> Result<Box<dyn Step>, ExecutorError> {
        let step_type = args.step_type.clone();
        let index = args.index;
        match self.ctors.get(&step_type) {
            Some(ctor) => ctor(args).map_err(|source| ExecutorError::StepInit {
                index,
                step_type,
                source,
            }),
            None => Err(ExecutorError::UnknownStepType { index, step_type }),
        }
    }

    /// A registry pre-populated with the control-flow steps the core
    /// specifies plus the minimal leaf I/O stubs (`read_files`,
    /// `write_files`) needed to run an end-to-end recipe. `llm_generate`
    /// and `mcp` are external-provider leaf steps and are not registered.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register("execute_recipe", Arc::new(steps::execute_recipe::build));
        registry.register("conditional", Arc::new(steps::conditional::build));
        registry.register("loop", Arc::new(steps::loop_step::build));
        registry.register("parallel", Arc::new(steps::parallel::build));
        registry.register("set_context", Arc::new(steps::set_context::build));
        registry.register("read_files", Arc::new(steps::read_files::build));
        registry.register("write_files", Arc::new(steps::write_files::build));
        registry
    }
}
