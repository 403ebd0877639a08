//! binsmith - standalone executables for npm and PyPI packages

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use binsmith_cli::cmd;
use binsmith_cli::cmd::build::BuildArgs;
use binsmith_cli::{Cli, Commands};
use binsmith_core::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_filter = if cli.verbose {
        "binsmith=debug,binsmith_core=debug,binsmith_cli=debug"
    } else {
        "binsmith=warn,binsmith_core=warn,binsmith_cli=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let settings = Settings::load(cli.home).context("Failed to load settings")?;

    match cli.command {
        Commands::Build {
            packages,
            ecosystem,
            target,
            registry,
            timeout,
            json,
        } => {
            let args = BuildArgs {
                packages,
                ecosystem,
                target,
                registry,
                timeout,
                json,
            };
            cmd::build::build(settings, args).await
        }
        Commands::List {
            page,
            per_page,
            json,
        } => cmd::list::list(&settings, page, per_page, json).await,
        Commands::Show { id } => cmd::show::show(&settings, id).await,
        Commands::Clean { dry_run } => cmd::clean::clean(&settings, dry_run).await,
        Commands::Completions { .. } => Ok(()),
    }
}
