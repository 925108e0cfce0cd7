//! Acquisition and wait protocol
//!
//! Every caller that needs a bundle runs the same loop:
//!
//! 1. Try to create the bundle directory. Success makes this process the
//!    sole installer. If the directory is cleared and taken over by someone
//!    else mid-install, fall through to waiting on the new owner.
//! 2. Otherwise poll every heartbeat interval until the readiness marker
//!    appears (done) or the liveness marker goes stale (abandoned: delete
//!    the directory and start over at 1).
//!
//! Coordination happens only through the filesystem, so callers may live in
//! different processes. There is no total wait limit; staleness detection
//! bounds installer inactivity, not caller patience.

use crate::cache::heartbeat::{Liveness, LivenessProbe};
use crate::cache::installer::Installer;
use crate::cache::key::PackageSet;
use crate::cache::layout::{BundleDir, StoreLayout};
use crate::config::Timing;
use crate::error::{DepotError, DepotResult};
use tracing::{debug, info, warn};

/// How a caller obtained a ready bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Readiness marker was already present
    AlreadyReady,
    /// This caller ran the installer
    Installed,
    /// Another process installed it while this caller waited
    Waited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Ready,
    Abandoned,
    Vanished,
}

/// Runs the protocol against one store
#[derive(Clone)]
pub struct Coordinator {
    layout: StoreLayout,
    timing: Timing,
    installer: Installer,
}

impl Coordinator {
    pub fn new(layout: StoreLayout, timing: Timing, installer: Installer) -> Self {
        Self {
            layout,
            timing,
            installer,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Block until the bundle for `set` is ready.
    ///
    /// Fails only when this caller became the installer and the install
    /// failed.
    pub async fn ensure_ready(&self, set: &PackageSet) -> DepotResult<Acquisition> {
        let bundle = self.layout.bundle(set.key());
        let mut waited = false;

        loop {
            if bundle.is_ready() {
                return Ok(if waited {
                    Acquisition::Waited
                } else {
                    Acquisition::AlreadyReady
                });
            }

            waited = true;
            if let Some(claim) = bundle.try_claim().await? {
                info!("Won install of bundle {} [{}]", bundle.key(), set);
                match self.installer.install(&claim, set).await {
                    Ok(()) => return Ok(Acquisition::Installed),
                    Err(DepotError::BundleLost { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }

            match self.wait(&bundle).await? {
                WaitOutcome::Ready => return Ok(Acquisition::Waited),
                WaitOutcome::Vanished => {
                    debug!("Bundle {} disappeared while waiting, retrying", bundle.key());
                }
                WaitOutcome::Abandoned => {
                    warn!("Reclaiming abandoned bundle {}", bundle.key());
                    bundle.remove().await?;
                }
            }
        }
    }

    async fn wait(&self, bundle: &BundleDir) -> DepotResult<WaitOutcome> {
        debug!("Waiting for bundle {}", bundle.key());
        let mut probe = LivenessProbe::new();

        loop {
            if bundle.is_ready() {
                return Ok(WaitOutcome::Ready);
            }
            if !bundle.exists() {
                return Ok(WaitOutcome::Vanished);
            }

            let liveness = probe.check(&bundle.heartbeat_path(), &self.timing).await?;
            if liveness == Liveness::Stale {
                // The installer may have finished between the two checks
                if bundle.is_ready() {
                    return Ok(WaitOutcome::Ready);
                }
                return Ok(WaitOutcome::Abandoned);
            }

            tokio::time::sleep(self.timing.heartbeat_interval).await;
        }
    }
}
