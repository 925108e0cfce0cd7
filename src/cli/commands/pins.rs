//! Pins command - exact versions for a script header

use crate::cache::{parse_requests, BundleCache};
use crate::cli::args::PinsArgs;
use crate::cli::commands::spinner;
use crate::config::Config;
use crate::error::DepotResult;

/// Execute the pins command
pub async fn execute(args: PinsArgs, config: &Config) -> DepotResult<()> {
    let (raw, versions) = parse_requests(&args.packages);
    let cache = BundleCache::open(config);

    let pb = spinner("Installing...");
    let result = cache.pins(&raw, &versions).await;
    pb.finish_and_clear();

    for (name, version) in result? {
        println!("{}@{}", name, version);
    }

    Ok(())
}
