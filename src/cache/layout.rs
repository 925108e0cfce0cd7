//! On-disk bundle store layout and bundle state
//!
//! ```text
//! <root>/
//!   errors.log                 shared installer error log
//!   bundles/<key>/
//!     package.json             manifest
//!     owner                    ownership token of the current installer
//!     heartbeat                liveness marker (installer only)
//!     index.json               readiness marker
//!     package-lock.json        written by the package manager
//!     node_modules/
//! ```
//!
//! Creating `bundles/<key>` with create-exclusive semantics is the only
//! mutual exclusion primitive. Whoever creates it installs, and stamps it
//! with a fresh owner token. A bundle removed and recreated under the same
//! key carries a different token, so the first installer can tell the
//! directory is no longer its own.

use crate::cache::heartbeat::{self, is_stale_at};
use crate::cache::key::{BundleKey, PackageSpec};
use crate::cache::manifest::Manifest;
use crate::config::Timing;
use crate::error::{DepotError, DepotResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Directory holding one subdirectory per bundle
pub const BUNDLES_DIR: &str = "bundles";

/// Shared error log at the cache root
pub const ERROR_LOG_FILE: &str = "errors.log";

/// Attempts at deleting a bundle tree that keeps changing underneath
const REMOVE_ATTEMPTS: u32 = 3;

/// File names inside a bundle directory
pub mod files {
    /// Dependency declaration for the package manager
    pub const MANIFEST: &str = "package.json";
    /// Token identifying the installer that created the directory
    pub const OWNER: &str = "owner";
    /// Liveness marker written by the installer
    pub const HEARTBEAT: &str = "heartbeat";
    /// Readiness marker, present only after a successful install
    pub const INDEX: &str = "index.json";
    /// Lock information produced by the package manager
    pub const LOCKFILE: &str = "package-lock.json";
    /// Installed packages
    pub const MODULES: &str = "node_modules";
}

/// State of a bundle directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleState {
    /// No directory
    Absent,
    /// Directory exists, installer alive
    Installing,
    /// Readiness marker present
    Ready,
    /// Directory exists, installer gone before readiness
    Abandoned,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Installing => write!(f, "installing"),
            Self::Ready => write!(f, "ready"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Maps bundle keys to directories under a cache root
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of all bundle directories
    pub fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    /// Path of the shared error log
    pub fn error_log_path(&self) -> PathBuf {
        self.root.join(ERROR_LOG_FILE)
    }

    /// The bundle directory for `key`. Pure: nothing is touched on disk.
    pub fn bundle(&self, key: &BundleKey) -> BundleDir {
        BundleDir {
            key: key.clone(),
            path: self.bundles_dir().join(key.as_str()),
        }
    }

    /// Enumerate bundle directories with their state
    pub async fn list(&self, timing: &Timing) -> DepotResult<Vec<BundleInfo>> {
        let bundles_dir = self.bundles_dir();
        let mut entries = match fs::read_dir(&bundles_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(DepotError::io("reading bundles directory", e)),
        };

        let mut bundles = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DepotError::io("reading bundle entry", e))?
        {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(BundleKey::from_dir_name) else {
                continue;
            };

            let bundle = self.bundle(&key);
            let state = bundle.state(timing).await?;
            if state == BundleState::Absent {
                continue;
            }

            let packages = Manifest::load(&bundle.manifest_path())
                .await
                .map(|m| m.packages())
                .unwrap_or_default();

            bundles.push(BundleInfo {
                created_at: bundle.created_at().await.unwrap_or_else(Utc::now),
                key,
                state,
                packages,
            });
        }

        // Newest first
        bundles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bundles)
    }

    /// Delete every bundle directory, returning how many were removed.
    /// The error log survives.
    pub async fn clear(&self) -> DepotResult<usize> {
        let bundles_dir = self.bundles_dir();
        let mut entries = match fs::read_dir(&bundles_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(DepotError::io("reading bundles directory", e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DepotError::io("reading bundle entry", e))?
        {
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(BundleKey::from_dir_name) {
                self.bundle(&key).remove().await?;
                removed += 1;
            }
        }

        debug!("Cleared {} bundle(s) from {}", removed, bundles_dir.display());
        Ok(removed)
    }
}

/// One bundle's directory and the files inside it
#[derive(Debug, Clone)]
pub struct BundleDir {
    key: BundleKey,
    path: PathBuf,
}

impl BundleDir {
    pub fn key(&self) -> &BundleKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(files::MANIFEST)
    }

    pub fn owner_path(&self) -> PathBuf {
        self.path.join(files::OWNER)
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.path.join(files::HEARTBEAT)
    }

    pub fn index_path(&self) -> PathBuf {
        self.path.join(files::INDEX)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.path.join(files::LOCKFILE)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.path.join(files::MODULES)
    }

    /// Whether the directory exists
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Whether the readiness marker exists
    pub fn is_ready(&self) -> bool {
        self.index_path().is_file()
    }

    /// Atomically create the directory. `Ok(false)` means someone else did.
    pub async fn try_create(&self) -> DepotResult<bool> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DepotError::DirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        match fs::create_dir(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(DepotError::DirCreate {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Create the directory and stamp it with a fresh owner token.
    ///
    /// `Ok(None)` means another caller created it, or it was removed again
    /// before the token landed.
    pub async fn try_claim(&self) -> DepotResult<Option<Claim>> {
        if !self.try_create().await? {
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        let path = self.owner_path();
        match fs::write(&path, &token).await {
            Ok(()) => Ok(Some(Claim {
                bundle: self.clone(),
                token,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Bundle {} vanished right after creation", self.key);
                Ok(None)
            }
            Err(e) => Err(DepotError::io(
                format!("writing owner token {}", path.display()),
                e,
            )),
        }
    }

    /// Delete the whole directory. A concurrent remover is not an error.
    ///
    /// A live installer may drop a file in while the tree is being removed,
    /// so a failed removal is retried before giving up.
    pub async fn remove(&self) -> DepotResult<()> {
        let mut attempt = 1;
        loop {
            match fs::remove_dir_all(&self.path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(_) if !self.path.exists() => return Ok(()),
                Err(e) if attempt >= REMOVE_ATTEMPTS => {
                    return Err(DepotError::io(
                        format!("removing bundle {}", self.path.display()),
                        e,
                    ))
                }
                Err(e) => {
                    debug!("Retrying removal of {}: {}", self.path.display(), e);
                    attempt += 1;
                }
            }
        }
    }

    /// Delete only the readiness marker. Returns whether it existed.
    pub async fn remove_ready_marker(&self) -> DepotResult<bool> {
        let path = self.index_path();
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DepotError::io(
                format!("removing readiness marker {}", path.display()),
                e,
            )),
        }
    }

    /// One-shot state snapshot.
    ///
    /// Without a waiter's observation history, a missing liveness marker is
    /// judged against the directory's age instead.
    pub async fn state(&self, timing: &Timing) -> DepotResult<BundleState> {
        if !self.exists() {
            return Ok(BundleState::Absent);
        }
        if self.is_ready() {
            return Ok(BundleState::Ready);
        }

        let now = heartbeat::now_millis();
        let abandoned = match heartbeat::read_marker(&self.heartbeat_path()).await? {
            Some(last) => is_stale_at(last, now, timing),
            None => {
                let created = self.created_at().await.unwrap_or_else(Utc::now);
                let grace = heartbeat::duration_millis(timing.max_creation_delay);
                now - created.timestamp_millis() > grace
            }
        };

        Ok(if abandoned {
            BundleState::Abandoned
        } else {
            BundleState::Installing
        })
    }

    async fn created_at(&self) -> Option<DateTime<Utc>> {
        let metadata = fs::metadata(&self.path).await.ok()?;
        let time: SystemTime = metadata.created().or_else(|_| metadata.modified()).ok()?;
        Some(DateTime::<Utc>::from(time))
    }
}

/// Ownership of one incarnation of a bundle directory
#[derive(Debug, Clone)]
pub struct Claim {
    bundle: BundleDir,
    token: String,
}

impl Claim {
    pub fn bundle(&self) -> &BundleDir {
        &self.bundle
    }

    /// Whether the directory on disk is still the one this claim created
    pub async fn is_held(&self) -> bool {
        match fs::read_to_string(self.bundle.owner_path()).await {
            Ok(token) => token == self.token,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("Reading owner of bundle {} failed: {}", self.bundle.key, e);
                }
                false
            }
        }
    }
}

/// Summary of a bundle for listing
#[derive(Debug, Clone)]
pub struct BundleInfo {
    pub key: BundleKey,
    pub state: BundleState,
    pub packages: Vec<PackageSpec>,
    pub created_at: DateTime<Utc>,
}
