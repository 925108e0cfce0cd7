//! Get command - resolve a package through the cache

use crate::cache::{parse_requests, BundleCache, PackageExport};
use crate::cli::args::{GetArgs, OutputFormat};
use crate::cli::commands::spinner;
use crate::config::Config;
use crate::error::{DepotError, DepotResult};

/// Execute the get command
pub async fn execute(args: GetArgs, config: &Config) -> DepotResult<()> {
    let (mut names, mut versions) = parse_requests(std::slice::from_ref(&args.package));
    let name = names
        .pop()
        .ok_or_else(|| DepotError::InvalidPackage(args.package.clone()))?;
    let (with, with_versions) = parse_requests(&args.with);
    versions.extend(with_versions);

    let cache = BundleCache::open(config);
    let pb = spinner(&format!("Resolving {}...", name));
    let result = if args.esm {
        cache.import(&name, &with, &versions).await
    } else {
        cache.get(&name, &with, &versions).await
    };
    pb.finish_and_clear();
    let export = result?;

    match args.format {
        OutputFormat::Table => print_export_table(&export),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&export)?),
        OutputFormat::Plain => println!("{}", export.entry.display()),
    }

    Ok(())
}

fn print_export_table(export: &PackageExport) {
    println!("{:<10} {}@{}", "PACKAGE", export.name, export.version);
    println!("{:<10} {}", "KIND", export.kind);
    println!("{:<10} {}", "ENTRY", export.entry.display());
    println!("{:<10} {}", "ROOT", export.root.display());
    println!("{:<10} {}", "BUNDLE", export.bundle);
}
