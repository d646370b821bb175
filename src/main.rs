//! voxkan - Main Entry Point

use clap::Parser;
use voxkan::cli::{cmd_compose, cmd_report, cmd_search, cmd_tune_lr, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxkan=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compose { csv, out, sexes } => {
            cmd_compose(&csv, &out, &sexes)?;
        }
        Commands::Search { data, out, config, steps, folds, seed } => {
            cmd_search(&data, &out, config.as_deref(), steps, folds, seed)?;
        }
        Commands::TuneLr { data, out, config, steps, folds, seed } => {
            cmd_tune_lr(&data, &out, config.as_deref(), steps, folds, seed)?;
        }
        Commands::Report { results, top } => {
            cmd_report(&results, top)?;
        }
    }

    Ok(())
}
