//! In-process package manager for tests
//!
//! Materializes `node_modules/<name>/package.json` and `index.js` for every
//! manifest dependency. Broken names fail the whole install when declared
//! as regular dependencies and are silently skipped when optional.

use crate::cache::errlog::ErrorLog;
use crate::cache::key::PackageSet;
use crate::cache::layout::BundleDir;
use crate::cache::manifest::Manifest;
use crate::error::{DepotError, DepotResult};
use crate::package_manager::PackageManager;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct FakePackageManager {
    installs: AtomicUsize,
    delay: Duration,
    broken: HashSet<String>,
}

impl FakePackageManager {
    pub(crate) fn new() -> Self {
        Self {
            installs: AtomicUsize::new(0),
            delay: Duration::ZERO,
            broken: HashSet::new(),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_broken(mut self, names: &[&str]) -> Self {
        self.broken = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Number of installs started so far
    pub(crate) fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    async fn install(
        &self,
        bundle: &BundleDir,
        set: &PackageSet,
        errors: &ErrorLog,
    ) -> DepotResult<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let manifest = Manifest::load(&bundle.manifest_path()).await?;

        if let Some(name) = manifest
            .dependencies
            .keys()
            .find(|name| self.broken.contains(*name))
        {
            errors
                .append(bundle.key().as_str(), &format!("404 Not Found: {name}"))
                .await;
            return Err(DepotError::InstallFailed {
                packages: set.to_string(),
                code: "1".to_string(),
                detail: format!("404 Not Found: {name}"),
            });
        }

        let names = manifest
            .dependencies
            .keys()
            .chain(manifest.optional_dependencies.keys())
            .filter(|name| !self.broken.contains(*name));

        for name in names {
            let dir = bundle.modules_dir().join(name);
            std::fs::create_dir_all(&dir).map_err(|e| DepotError::io("fake install", e))?;
            let meta = serde_json::json!({"name": name, "version": "1.0.0"});
            std::fs::write(dir.join("package.json"), meta.to_string())
                .map_err(|e| DepotError::io("fake install", e))?;
            std::fs::write(dir.join("index.js"), "module.exports = {}")
                .map_err(|e| DepotError::io("fake install", e))?;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
