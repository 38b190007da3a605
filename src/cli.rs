//! Command-line argument parsing: a positional recipe path plus repeatable
//! `KEY=VALUE` flags for initial context and config.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "recipe_exec", about = "Run a declarative JSON recipe")]
pub struct Cli {
    /// Path to the recipe file, or a JSON recipe string.
    pub recipe: String,

    /// Directory log files are written under.
    #[arg(long, default_value = "logs")]
    pub log_dir: String,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Initial context artifacts, KEY=VALUE, repeatable.
    #[arg(long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Initial config values, KEY=VALUE, repeatable; overrides environment.
    #[arg(long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,
}
