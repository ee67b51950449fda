// ABOUTME: Entry point for the hoist CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{Completion, PromoteArgs, RollbackTarget};
use hoist::config::{self, Config};
use hoist::error::Result;
use hoist::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    match run(cli, mode).await {
        Ok(completion) => std::process::exit(completion.exit_code()),
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<Completion> {
    let output = Output::new(mode);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { image, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
        }
        Commands::Resolve {
            revision,
            set_version,
        } => {
            commands::resolve(&revision, set_version.as_deref(), &output)?;
        }
        Commands::Build {
            revision,
            set_version,
            context,
            push,
            output: artifact_path,
        } => {
            let config = load_config(config_path)?;
            commands::build(
                &config,
                &revision,
                set_version.as_deref(),
                context,
                push,
                &artifact_path,
                output,
            )
            .await?;
        }
        Commands::Push { artifact, retries } => {
            let config = load_config(config_path)?;
            commands::push(&config, &artifact, retries, output).await?;
        }
        Commands::Gate { source, env } => {
            let config = load_config(config_path)?;
            commands::gate(&config, &source, &env, output).await?;
        }
        Commands::Promote {
            source,
            env,
            actor,
            skip,
            reevaluate,
            retries,
        } => {
            let config = load_config(config_path)?;
            let args = PromoteArgs {
                source: &source,
                environment: &env,
                actor: actor.as_deref(),
                skip,
                reevaluate,
                retries,
            };
            commands::promote(&config, args, output).await?;
        }
        Commands::Rollback {
            env,
            to,
            previous: _,
            actor,
            retries,
        } => {
            let config = load_config(config_path)?;
            let target = match to {
                Some(seq) => RollbackTarget::Record(seq),
                None => RollbackTarget::Previous,
            };
            return commands::rollback(&config, &env, target, actor.as_deref(), retries, output)
                .await;
        }
        Commands::Status => {
            let config = load_config(config_path)?;
            commands::status(&config, &output)?;
        }
        Commands::History { env, limit } => {
            let config = load_config(config_path)?;
            commands::history(&config, &env, limit, &output)?;
        }
    }
    Ok(Completion::Done)
}
