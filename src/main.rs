use clap::Parser;
use recipe_exec::cli::Cli;
use recipe_exec::config;
use recipe_exec::context::Context;
use recipe_exec::executor::Executor;
use recipe_exec::logging;
use recipe_exec::recipe::RecipeInput;
use recipe_exec::registry::Registry;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbosity);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "recipe execution failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut artifacts = Vec::new();
    for entry in &cli.context {
        artifacts.push(config::parse_key_value(entry)?);
    }

    let config_overrides = cli
        .config
        .iter()
        .map(|entry| config::parse_key_value(entry))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let config_map = config::load_config(config_overrides);

    let mut context = Context::with_config(config_map);
    for (key, value) in artifacts {
        context.set(key, value);
    }

    let registry = Arc::new(Registry::with_builtin_steps());
    let executor = Executor::new(registry);
    executor
        .execute(RecipeInput::Text(cli.recipe.clone()), &mut context)
        .await?;

    Ok(())
}
