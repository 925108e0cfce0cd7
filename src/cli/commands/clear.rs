//! Clear command - delete every bundle

use crate::cache::BundleCache;
use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::DepotResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> DepotResult<()> {
    let cache = BundleCache::open(config);
    let bundles = cache.list().await?;

    if bundles.is_empty() {
        println!("No bundles to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} bundle(s) from {}",
        bundles.len(),
        cache.layout().root().display()
    );

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = cache.clear().await?;
    println!("{} cleared {} bundle(s)", style("✓").green(), removed);

    Ok(())
}
