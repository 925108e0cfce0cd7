//! Bundle installer
//!
//! Runs only in the process that won the directory-creation race. Order of
//! effects inside the bundle: liveness marker, manifest, package manager,
//! readiness marker, liveness marker removed. The readiness marker is never
//! written after a failed install, nor into a directory that was removed
//! and recreated by another caller in the meantime.

use crate::cache::errlog::ErrorLog;
use crate::cache::heartbeat::Heartbeat;
use crate::cache::index::BundleIndex;
use crate::cache::key::PackageSet;
use crate::cache::layout::Claim;
use crate::cache::manifest::Manifest;
use crate::config::Timing;
use crate::error::{DepotError, DepotResult};
use crate::package_manager::PackageManager;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supervises one package manager run per bundle
#[derive(Clone)]
pub struct Installer {
    manager: Arc<dyn PackageManager>,
    errors: ErrorLog,
    timing: Timing,
}

impl Installer {
    pub fn new(manager: Arc<dyn PackageManager>, errors: ErrorLog, timing: Timing) -> Self {
        Self {
            manager,
            errors,
            timing,
        }
    }

    /// Install `set` into the bundle this caller just claimed.
    ///
    /// Fails with [`DepotError::BundleLost`] when the directory changed
    /// owner mid-install; nothing is published into it then.
    pub async fn install(&self, claim: &Claim, set: &PackageSet) -> DepotResult<()> {
        let bundle = claim.bundle();
        let heartbeat = match Heartbeat::start(claim, &self.timing).await {
            Ok(heartbeat) => heartbeat,
            Err(e) => return Err(ownership_checked(claim, e).await),
        };

        let result = match self.run(claim, set).await {
            Ok(()) => Ok(()),
            Err(e) => Err(ownership_checked(claim, e).await),
        };

        if let Err(e) = heartbeat.stop().await {
            warn!("Failed to remove liveness marker of {}: {}", bundle.key(), e);
        }

        match &result {
            Ok(()) => info!("Bundle {} ready", bundle.key()),
            Err(DepotError::BundleLost { .. }) => {
                info!("Bundle {} was taken over by another caller", bundle.key())
            }
            Err(e) => warn!("Bundle {} failed to install: {}", bundle.key(), e),
        }
        result
    }

    async fn run(&self, claim: &Claim, set: &PackageSet) -> DepotResult<()> {
        let bundle = claim.bundle();
        Manifest::for_set(set)
            .write(&bundle.manifest_path())
            .await?;

        info!(
            "Installing [{}] into {} with {}",
            set,
            bundle.key(),
            self.manager.name()
        );
        self.manager.install(bundle, set, &self.errors).await?;

        let index = BundleIndex::build(bundle, set).await?;
        if index.packages.len() < set.specs().len() {
            let missing: Vec<_> = set.names().filter(|n| !index.contains(n)).collect();
            warn!(
                "Bundle {} is missing optional packages: {}",
                bundle.key(),
                missing.join(", ")
            );
        }

        if !claim.is_held().await {
            return Err(DepotError::BundleLost {
                key: bundle.key().to_string(),
            });
        }
        index.publish(bundle).await
    }
}

/// `e`, or `BundleLost` when the failure came from losing the directory
async fn ownership_checked(claim: &Claim, e: DepotError) -> DepotError {
    if claim.is_held().await {
        return e;
    }
    debug!(
        "Install into {} ended after losing ownership: {}",
        claim.bundle().key(),
        e
    );
    DepotError::BundleLost {
        key: claim.bundle().key().to_string(),
    }
}
