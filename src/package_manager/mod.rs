//! Package manager abstraction
//!
//! Installing the packages of a manifest is an opaque operation with
//! binary success or failure. The bundle cache only needs this trait; the
//! real implementation runs an external executable in the bundle directory.

mod command;
#[cfg(test)]
pub(crate) mod fake;

pub use command::CommandPackageManager;

use crate::cache::errlog::ErrorLog;
use crate::cache::key::PackageSet;
use crate::cache::layout::BundleDir;
use crate::config::InstallerConfig;
use crate::error::DepotResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Max number of stderr lines carried in an install failure
const ERROR_TAIL_LINES: usize = 20;

/// Installs a bundle's manifest
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Install the manifest already written in `bundle`.
    ///
    /// Diagnostics go to `errors`. Blocks until the install has finished.
    async fn install(
        &self,
        bundle: &BundleDir,
        set: &PackageSet,
        errors: &ErrorLog,
    ) -> DepotResult<()>;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}

/// Create the package manager described by the configuration
pub fn create_package_manager(config: &InstallerConfig) -> Arc<dyn PackageManager> {
    Arc::new(CommandPackageManager::from_config(config))
}

/// Last `ERROR_TAIL_LINES` lines of installer output, for error messages
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
