//! Depot - shared package bundle cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depot::cli::{Cli, Commands};
use depot::config::ConfigManager;
use depot::error::DepotResult;
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

async fn run() -> DepotResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("depot=warn"),
        1 => EnvFilter::new("depot=info"),
        _ => EnvFilter::new("depot=debug"),
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

    debug!(
        "Using config {} and cache {}",
        config_manager.path().display(),
        ConfigManager::cache_dir(&config).display()
    );

    match cli.command {
        Commands::Warm(args) => {
            depot::cli::commands::warm(args, &config, config_manager.path()).await
        }
        Commands::Get(args) => depot::cli::commands::get(args, &config).await,
        Commands::List(args) => depot::cli::commands::list(args, &config).await,
        Commands::Clear(args) => depot::cli::commands::clear(args, &config).await,
        Commands::Pins(args) => depot::cli::commands::pins(args, &config).await,
        Commands::Config(args) => {
            depot::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Preload(args) => depot::cli::commands::preload(args, &config).await,
    }
}
