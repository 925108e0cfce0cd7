//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Depot - shared package bundle cache
///
/// Installs the packages scripts ask for into content-addressed bundles
/// that any number of processes can share without stepping on each other.
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEPOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides [cache] dir)
    #[arg(long, global = true, env = "DEPOT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log format (overrides [general] log_format)
    #[arg(long, global = true, value_parser = ["text", "json"])]
    pub log_format: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a bundle ahead of time
    Warm(WarmArgs),

    /// Resolve a package through the cache
    Get(GetArgs),

    /// List bundles in the cache
    List(ListArgs),

    /// Delete every bundle
    Clear(ClearArgs),

    /// Print the exact versions installed for a package list
    Pins(PinsArgs),

    /// Show configuration
    Config(ConfigArgs),

    /// Install a bundle (target of detached warm)
    #[command(hide = true)]
    Preload(PreloadArgs),
}

/// Arguments for the warm command
#[derive(Parser, Debug)]
pub struct WarmArgs {
    /// Packages, optionally pinned (name@version)
    #[arg(required = true)]
    pub packages: Vec<String>,

    /// Install in the background and return immediately
    #[arg(short, long)]
    pub detach: bool,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Package to resolve, optionally pinned (name@version)
    pub package: String,

    /// Other packages the caller uses (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub with: Vec<String>,

    /// Resolve the module entry instead of the CommonJS one
    #[arg(long)]
    pub esm: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the pins command
#[derive(Parser, Debug)]
pub struct PinsArgs {
    /// Packages, optionally pinned (name@version)
    #[arg(required = true)]
    pub packages: Vec<String>,
}

/// Arguments for the preload command
#[derive(Parser, Debug)]
pub struct PreloadArgs {
    /// Packages, optionally pinned (name@version)
    #[arg(required = true)]
    pub packages: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
