//! List command - show bundles in the cache

use crate::cache::{BundleCache, BundleInfo, BundleState};
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::DepotResult;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> DepotResult<()> {
    let bundles = BundleCache::open(config).list().await?;

    if bundles.is_empty() && matches!(args.format, OutputFormat::Table) {
        println!("No bundles found.");
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&bundles),
        OutputFormat::Json => print_json(&bundles)?,
        OutputFormat::Plain => print_plain(&bundles),
    }

    Ok(())
}

fn print_table(bundles: &[BundleInfo]) {
    println!(
        "{:<34} {:<11} {:<17} {}",
        "BUNDLE", "STATE", "CREATED", "PACKAGES"
    );
    println!("{}", "-".repeat(90));

    for bundle in bundles {
        let state = match bundle.state {
            BundleState::Ready => style("ready").green(),
            BundleState::Installing => style("installing").yellow(),
            BundleState::Abandoned => style("abandoned").red(),
            BundleState::Absent => style("absent").dim(),
        };

        println!(
            "{:<34} {:<11} {:<17} {}",
            bundle.key,
            state.to_string(),
            bundle.created_at.format("%Y-%m-%d %H:%M"),
            packages(bundle)
        );
    }

    println!();
    println!("Total: {} bundle(s)", bundles.len());
}

fn print_json(bundles: &[BundleInfo]) -> DepotResult<()> {
    #[derive(serde::Serialize)]
    struct BundleJson {
        key: String,
        state: BundleState,
        packages: Vec<String>,
        created_at: String,
    }

    let json: Vec<BundleJson> = bundles
        .iter()
        .map(|b| BundleJson {
            key: b.key.to_string(),
            state: b.state,
            packages: b.packages.iter().map(ToString::to_string).collect(),
            created_at: b.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(bundles: &[BundleInfo]) {
    for bundle in bundles {
        println!("{}", bundle.key);
    }
}

fn packages(bundle: &BundleInfo) -> String {
    if bundle.packages.is_empty() {
        return style("-").dim().to_string();
    }
    bundle
        .packages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
