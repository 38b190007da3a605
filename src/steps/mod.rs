//! The built-in step implementations: the five control-flow steps
//! (`execute_recipe`, `conditional`, `loop`, `parallel`, `set_context`), the
//! restricted expression language `conditional` evaluates against, and the
//! minimal leaf I/O stubs needed to run a recipe end-to-end.

pub mod conditional;
pub mod execute_recipe;
pub mod expression;
pub mod loop_step;
pub mod parallel;
pub mod read_files;
pub mod set_context;
pub mod write_files;
