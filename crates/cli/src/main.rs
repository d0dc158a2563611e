mod backend;
mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fanwatch_core::config::load_dotenv;
use fanwatch_core::Config;

use crate::backend::Backend;
use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let env_config = Config::from_env();
    env_config.log_summary();
    let tuning = config::load_tuning(&args.config)?;

    let command = match args.command {
        Command::Config => {
            let out = serde_json::json!({ "env": env_config.redacted_summary(), "tuning": tuning });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }
        Command::Store(command) => command,
    };

    let backend = match &args.dataset {
        Some(dataset) => {
            let snapshot = args
                .schedule_out
                .clone()
                .unwrap_or_else(|| env_config.storage.schedule_snapshot_path());
            Backend::memory(dataset, snapshot)?
        }
        None => Backend::postgres(&env_config).await?,
    };

    let out = commands::execute(&command, &backend, &tuning)
        .await
        .context("command failed")?;
    backend.persist()?;

    println!("{}", serde_json::to_string_pretty(&out)?);
    info!("Done");
    Ok(())
}
