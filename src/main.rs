//! Sigflow CLI - Derived Signal Computation
//!
//! Command-line interface for computing derived signals offline.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sigflow::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Sigflow v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Sigflow v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Compute {
            definitions,
            analysis,
            config,
        } => {
            let report = commands::compute(&definitions, &analysis, config.as_deref())?;
            if !report.is_clean() {
                anyhow::bail!(
                    "{} signal(s) failed, {} blocked by cycles",
                    report.failed.len(),
                    report.blocked.len()
                );
            }
            Ok(())
        }
        Commands::Order { definitions } => Ok(commands::order(&definitions)?),
        Commands::Validate { definitions } => Ok(commands::validate(&definitions)?),
    }
}
