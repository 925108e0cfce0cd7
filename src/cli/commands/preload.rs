//! Preload command - body of a detached warm
//!
//! Runs with stdio detached, so failures only reach the log and the
//! store's error log.

use crate::cache::{parse_requests, BundleCache};
use crate::cli::args::PreloadArgs;
use crate::config::Config;
use crate::error::DepotResult;
use tracing::{info, warn};

/// Execute the preload command
pub async fn execute(args: PreloadArgs, config: &Config) -> DepotResult<()> {
    let (raw, versions) = parse_requests(&args.packages);
    let cache = BundleCache::open(config);

    match cache.preload_blocking(&raw, &versions).await {
        Ok(acquisition) => info!("Preload finished: {:?}", acquisition),
        Err(e) => warn!("Preload failed: {}", e),
    }

    Ok(())
}
