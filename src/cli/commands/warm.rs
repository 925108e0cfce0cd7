//! Warm command - install a bundle ahead of time

use crate::cache::{parse_requests, Acquisition, BundleCache, PackageSet, PreloadLauncher};
use crate::cli::args::WarmArgs;
use crate::cli::commands::spinner;
use crate::config::{Config, ConfigManager};
use crate::error::DepotResult;
use console::style;
use std::path::Path;

/// Execute the warm command
pub async fn execute(args: WarmArgs, config: &Config, config_path: &Path) -> DepotResult<()> {
    let (raw, versions) = parse_requests(&args.packages);
    let set = PackageSet::resolve(&raw, &versions)?;
    let cache_dir = ConfigManager::cache_dir(config);

    if args.detach {
        let launcher = PreloadLauncher::current_exe(&cache_dir, Some(config_path))?;
        BundleCache::from_config(config, cache_dir)
            .with_launcher(launcher)
            .preload(&raw, &versions);
        println!(
            "{} Warming bundle {} in the background",
            style("•").cyan(),
            set.key()
        );
        return Ok(());
    }

    let cache = BundleCache::from_config(config, cache_dir);
    let pb = spinner(&format!("Installing {}...", set));
    let result = cache.preload_blocking(&raw, &versions).await;
    pb.finish_and_clear();

    let how = match result? {
        Acquisition::AlreadyReady => "already cached",
        Acquisition::Installed => "installed",
        Acquisition::Waited => "installed by another process",
    };
    println!(
        "{} Bundle {} ready ({})",
        style("✓").green(),
        set.key(),
        how
    );

    Ok(())
}
