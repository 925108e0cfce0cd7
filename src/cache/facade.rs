//! Cache facade
//!
//! The entry points scripts and the CLI use. `get` and `import` resolve a
//! package from the shared bundle of everything the caller uses, falling
//! back to a dedicated single-package bundle when the shared one cannot
//! provide it.

use crate::cache::errlog::ErrorLog;
use crate::cache::index::{BundleIndex, ExportKind, PackageExport, PackageResolver};
use crate::cache::installer::Installer;
use crate::cache::key::{package_name, BundleKey, PackageSet, VersionPins};
use crate::cache::layout::{BundleInfo, StoreLayout};
use crate::cache::pins::installed_versions;
use crate::cache::protocol::{Acquisition, Coordinator};
use crate::config::{Config, ConfigManager, Timing};
use crate::error::{DepotError, DepotResult};
use crate::package_manager::{create_package_manager, PackageManager};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Hidden subcommand that runs a detached preload
pub const PRELOAD_COMMAND: &str = "preload";

/// Spawns detached preload processes
#[derive(Debug, Clone)]
pub struct PreloadLauncher {
    program: PathBuf,
    base_args: Vec<String>,
}

impl PreloadLauncher {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Re-run the current executable against the same store and config
    pub fn current_exe(cache_dir: &Path, config_path: Option<&Path>) -> DepotResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| DepotError::io("locating current executable", e))?;

        let mut base_args = vec![
            "--cache-dir".to_string(),
            cache_dir.display().to_string(),
        ];
        if let Some(path) = config_path {
            base_args.push("--config".to_string());
            base_args.push(path.display().to_string());
        }
        base_args.push(PRELOAD_COMMAND.to_string());

        Ok(Self::new(program, base_args))
    }

    /// Start the preload in its own process group and return immediately.
    ///
    /// The child is reaped on a background thread.
    fn spawn(&self, set: &PackageSet) -> std::io::Result<u32> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(set.specs().iter().map(ToString::to_string))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        std::thread::Builder::new()
            .name(format!("depot-preload-{pid}"))
            .spawn(move || {
                if let Err(e) = child.wait() {
                    debug!("Failed to reap preload process {}: {}", pid, e);
                }
            })?;
        Ok(pid)
    }
}

/// Process-local view of one bundle store
pub struct BundleCache {
    coordinator: Coordinator,
    launcher: Option<PreloadLauncher>,
    indexes: Mutex<HashMap<BundleKey, Arc<BundleIndex>>>,
}

impl BundleCache {
    /// Cache over `cache_dir` using the configured package manager
    pub fn from_config(config: &Config, cache_dir: PathBuf) -> Self {
        Self::new(
            cache_dir,
            config.cache.timing(),
            create_package_manager(&config.installer),
        )
    }

    pub fn new(cache_dir: PathBuf, timing: Timing, manager: Arc<dyn PackageManager>) -> Self {
        let layout = StoreLayout::new(cache_dir);
        let installer = Installer::new(manager, ErrorLog::new(layout.error_log_path()), timing);
        Self {
            coordinator: Coordinator::new(layout, timing, installer),
            launcher: None,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Enable detached preloads
    pub fn with_launcher(mut self, launcher: PreloadLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Cache for the store in `config`, resolving the store the CLI way
    pub fn open(config: &Config) -> Self {
        Self::from_config(config, ConfigManager::cache_dir(config))
    }

    pub fn layout(&self) -> &StoreLayout {
        self.coordinator.layout()
    }

    pub fn timing(&self) -> &Timing {
        self.coordinator.timing()
    }

    /// Warm the bundle for `packages` in a detached process.
    ///
    /// Never blocks and never reports failure.
    pub fn preload<S: AsRef<str>>(&self, packages: &[S], versions: &VersionPins) {
        let set = match PackageSet::resolve(packages, versions) {
            Ok(set) => set,
            Err(e) => {
                warn!("Skipping preload: {}", e);
                return;
            }
        };

        if self.layout().bundle(set.key()).is_ready() {
            debug!("Bundle {} already ready, nothing to preload", set.key());
            return;
        }

        let Some(launcher) = &self.launcher else {
            debug!("No preload launcher configured, skipping preload of [{}]", set);
            return;
        };

        match launcher.spawn(&set) {
            Ok(pid) => info!("Preloading bundle {} in background (pid {})", set.key(), pid),
            Err(e) => warn!("Failed to start background preload of [{}]: {}", set, e),
        }
    }

    /// Run the acquisition protocol for `packages` and wait until ready
    pub async fn preload_blocking<S: AsRef<str>>(
        &self,
        packages: &[S],
        versions: &VersionPins,
    ) -> DepotResult<Acquisition> {
        let set = PackageSet::resolve(packages, versions)?;
        self.coordinator.ensure_ready(&set).await
    }

    /// CommonJS export of `name`, preferring the bundle of `bundle_list`
    pub async fn get<S: AsRef<str>>(
        &self,
        name: &str,
        bundle_list: &[S],
        versions: &VersionPins,
    ) -> DepotResult<PackageExport> {
        self.fetch(name, bundle_list, versions, ExportKind::CommonJs)
            .await
    }

    /// Module export of `name`, preferring the bundle of `bundle_list`
    pub async fn import<S: AsRef<str>>(
        &self,
        name: &str,
        bundle_list: &[S],
        versions: &VersionPins,
    ) -> DepotResult<PackageExport> {
        self.fetch(name, bundle_list, versions, ExportKind::Module)
            .await
    }

    /// Exact versions installed for `packages`, installing first if needed
    pub async fn pins<S: AsRef<str>>(
        &self,
        packages: &[S],
        versions: &VersionPins,
    ) -> DepotResult<VersionPins> {
        let set = PackageSet::resolve(packages, versions)?;
        self.coordinator.ensure_ready(&set).await?;
        installed_versions(&self.layout().bundle(set.key()), &set).await
    }

    /// All bundles in the store
    pub async fn list(&self) -> DepotResult<Vec<BundleInfo>> {
        self.layout().list(self.timing()).await
    }

    /// Delete every bundle. Returns how many were removed.
    pub async fn clear(&self) -> DepotResult<usize> {
        self.indexes().clear();
        self.layout().clear().await
    }

    async fn fetch<S: AsRef<str>>(
        &self,
        name: &str,
        bundle_list: &[S],
        versions: &VersionPins,
        kind: ExportKind,
    ) -> DepotResult<PackageExport> {
        let name = package_name(name).ok_or_else(|| DepotError::InvalidPackage(name.to_string()))?;

        let mut requested: Vec<&str> = bundle_list.iter().map(|s| s.as_ref()).collect();
        requested.push(name);
        let shared = PackageSet::resolve(&requested, versions)?;
        let dedicated = PackageSet::single(name, versions)?;

        match self.resolve_in(&shared, name, kind).await {
            Ok(export) => return Ok(export),
            Err(e) if e.is_recoverable() => {
                debug!("{} unavailable from bundle {}: {}", name, shared.key(), e);
            }
            Err(e) => return Err(e),
        }

        if shared.key() != dedicated.key() {
            warn!("Falling back to dedicated bundle {} for {}", dedicated.key(), name);
            match self.resolve_in(&dedicated, name, kind).await {
                Ok(export) => return Ok(export),
                Err(e) if e.is_recoverable() => {
                    warn!("{} unavailable from dedicated bundle {}: {}", name, dedicated.key(), e);
                }
                Err(e) => return Err(e),
            }
        }

        // Don't let the next caller trust a bundle that just failed us
        self.indexes().remove(dedicated.key());
        let bundle = self.layout().bundle(dedicated.key());
        if let Err(e) = bundle.remove_ready_marker().await {
            warn!("Failed to invalidate bundle {}: {}", dedicated.key(), e);
        }

        Err(DepotError::PackageUnavailable {
            name: name.to_string(),
        })
    }

    async fn resolve_in(
        &self,
        set: &PackageSet,
        name: &str,
        kind: ExportKind,
    ) -> DepotResult<PackageExport> {
        let index = self.ready_index(set).await?;
        match kind {
            ExportKind::CommonJs => index.resolve_sync(name),
            ExportKind::Module => index.resolve_async(name).await,
        }
    }

    /// Loaded index of a ready bundle, installing it if necessary
    async fn ready_index(&self, set: &PackageSet) -> DepotResult<Arc<BundleIndex>> {
        let bundle = self.layout().bundle(set.key());

        let cached = if bundle.is_ready() {
            self.indexes().get(set.key()).cloned()
        } else {
            self.indexes().remove(set.key());
            None
        };
        if let Some(index) = cached {
            return Ok(index);
        }

        self.coordinator.ensure_ready(set).await?;

        let index = Arc::new(BundleIndex::load(&bundle).await?);
        self.indexes().insert(set.key().clone(), index.clone());
        Ok(index)
    }

    fn indexes(&self) -> MutexGuard<'_, HashMap<BundleKey, Arc<BundleIndex>>> {
        self.indexes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
