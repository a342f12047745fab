//! snapdelta - build snapshot cache and change detection
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use snapdelta::cli::{commands, Cli, Commands};
use snapdelta::config::ConfigManager;
use snapdelta::error::SnapResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SnapResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("snapdelta=warn"),
        1 => EnvFilter::new("snapdelta=info"),
        _ => EnvFilter::new("snapdelta=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }
    debug!("Loaded configuration from {}", manager.path().display());

    match cli.command {
        Commands::Snapshot(args) => commands::snapshot(args, &config).await,
        Commands::Poll(args) => commands::poll(args, &config).await,
        Commands::View(args) => commands::view(args, &config).await,
        Commands::Lookup(args) => commands::lookup(args, &config).await,
        Commands::Jobs(args) => commands::jobs(args, &config).await,
        Commands::Cache(args) => commands::cache(args, &config).await,
        Commands::Checksums(args) => commands::checksums(args, &config).await,
        Commands::Cp(args) => commands::cp(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &manager).await,
    }
}
