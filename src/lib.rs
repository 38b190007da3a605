//! A declarative JSON recipe executor: typed steps, a templated shared
//! context, and composable sub-recipes (including `loop`/`parallel`
//! concurrency). The executor, context, registry and template layers are
//! domain-agnostic; only the leaf I/O steps (`read_files`/`write_files`)
//! know anything about files.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod recipe;
pub mod registry;
pub mod schema;
pub mod step;
pub mod steps;
pub mod template;
