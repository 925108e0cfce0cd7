//! Readiness marker: the bundle index
//!
//! `index.json` is written once, after the package manager exited
//! successfully, by renaming a fully written temp file into place. Readers
//! either see no index or a complete one. It maps every package that
//! actually landed in `node_modules` to its entry points and exposes them
//! through [`PackageResolver`].

use crate::cache::key::{BundleKey, PackageSet, VersionPins};
use crate::cache::layout::BundleDir;
use crate::error::{DepotError, DepotResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Default CommonJS entry when `main` is absent
const DEFAULT_MAIN: &str = "index.js";

/// Resolve installed packages to loadable entry points
#[async_trait]
pub trait PackageResolver: Send + Sync {
    /// CommonJS entry of `name`, checked with blocking IO
    fn resolve_sync(&self, name: &str) -> DepotResult<PackageExport>;

    /// Module (ESM) entry of `name`, checked with async IO
    async fn resolve_async(&self, name: &str) -> DepotResult<PackageExport>;
}

/// Flavor of a resolved entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    CommonJs,
    Module,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommonJs => write!(f, "commonjs"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// A package reference handed to calling code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageExport {
    pub name: String,
    pub version: String,
    /// Absolute package directory
    pub root: PathBuf,
    /// Absolute entry file
    pub entry: PathBuf,
    pub kind: ExportKind,
    /// Bundle the package was resolved from
    pub bundle: BundleKey,
}

/// Per-package record in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub version: String,
    /// Package directory relative to the bundle
    pub dir: PathBuf,
    /// CommonJS entry relative to the package directory
    pub main: String,
    /// Module entry relative to the package directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// Contents of `index.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleIndex {
    pub key: BundleKey,
    pub created_at: DateTime<Utc>,
    pub packages: BTreeMap<String, IndexEntry>,
    #[serde(skip)]
    base: PathBuf,
}

impl BundleIndex {
    /// Scan the bundle's `node_modules` for the requested packages
    pub async fn build(bundle: &BundleDir, set: &PackageSet) -> DepotResult<Self> {
        let mut packages = BTreeMap::new();

        for name in set.names() {
            let dir = PathBuf::from(crate::cache::layout::files::MODULES).join(name);
            let package_json = bundle.path().join(&dir).join("package.json");

            let content = match fs::read_to_string(&package_json).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} was not installed into bundle {}", name, bundle.key());
                    continue;
                }
                Err(e) => {
                    return Err(DepotError::io(
                        format!("reading {}", package_json.display()),
                        e,
                    ))
                }
            };

            match serde_json::from_str::<Value>(&content) {
                Ok(meta) => {
                    packages.insert(name.to_string(), IndexEntry::from_package_json(dir, &meta));
                }
                Err(e) => warn!("Skipping {} with unreadable package.json: {}", name, e),
            }
        }

        Ok(Self {
            key: bundle.key().clone(),
            created_at: Utc::now(),
            packages,
            base: bundle.path().to_path_buf(),
        })
    }

    /// Write the index into place atomically
    pub async fn publish(&self, bundle: &BundleDir) -> DepotResult<()> {
        let path = bundle.index_path();
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| DepotError::io(format!("writing index {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| DepotError::io(format!("publishing index {}", path.display()), e))
    }

    /// Load a published index
    pub async fn load(bundle: &BundleDir) -> DepotResult<Self> {
        let path = bundle.index_path();
        let corrupt = |reason: String| DepotError::IndexCorrupt {
            path: path.clone(),
            reason,
        };

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| corrupt(e.to_string()))?;
        let mut index: Self = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

        if &index.key != bundle.key() {
            return Err(corrupt(format!("index belongs to bundle {}", index.key)));
        }

        index.base = bundle.path().to_path_buf();
        Ok(index)
    }

    /// Whether `name` was installed
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Installed versions recorded in the index
    pub fn versions(&self) -> VersionPins {
        self.packages
            .iter()
            .map(|(name, entry)| (name.clone(), entry.version.clone()))
            .collect()
    }

    fn entry(&self, name: &str) -> DepotResult<&IndexEntry> {
        self.packages
            .get(name)
            .ok_or_else(|| self.not_in_bundle(name))
    }

    fn not_in_bundle(&self, name: &str) -> DepotError {
        DepotError::PackageNotInBundle {
            name: name.to_string(),
            key: self.key.to_string(),
        }
    }

    fn export(&self, name: &str, entry: &IndexEntry, file: PathBuf, kind: ExportKind) -> PackageExport {
        PackageExport {
            name: name.to_string(),
            version: entry.version.clone(),
            root: self.base.join(&entry.dir),
            entry: file,
            kind,
            bundle: self.key.clone(),
        }
    }
}

#[async_trait]
impl PackageResolver for BundleIndex {
    fn resolve_sync(&self, name: &str) -> DepotResult<PackageExport> {
        let entry = self.entry(name)?;
        let root = self.base.join(&entry.dir);

        let file = entry_candidates(&root, &entry.main)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| self.not_in_bundle(name))?;

        Ok(self.export(name, entry, file, ExportKind::CommonJs))
    }

    async fn resolve_async(&self, name: &str) -> DepotResult<PackageExport> {
        let entry = self.entry(name)?;
        let root = self.base.join(&entry.dir);
        let (target, kind) = match &entry.module {
            Some(module) => (module.as_str(), ExportKind::Module),
            None => (entry.main.as_str(), ExportKind::CommonJs),
        };

        for candidate in entry_candidates(&root, target) {
            if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
                return Ok(self.export(name, entry, candidate, kind));
            }
        }

        Err(self.not_in_bundle(name))
    }
}

impl IndexEntry {
    fn from_package_json(dir: PathBuf, meta: &Value) -> Self {
        let version = meta
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0")
            .to_string();
        let main = meta
            .get("main")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(normalize)
            .unwrap_or_else(|| DEFAULT_MAIN.to_string());
        let module = meta
            .get("module")
            .and_then(Value::as_str)
            .or_else(|| meta.get("exports").and_then(import_target))
            .map(normalize);

        Self {
            version,
            dir,
            main,
            module,
        }
    }
}

/// Module entry from an `exports` field: a string, `{".": ...}`, or
/// top-level conditions.
fn import_target(exports: &Value) -> Option<&str> {
    match exports {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => match map.get(".") {
            Some(root) => import_target(root),
            None => ["import", "default"]
                .iter()
                .find_map(|cond| map.get(*cond))
                .and_then(import_target),
        },
        _ => None,
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

/// Node-style file candidates for an entry: as-is, `.js`, `/index.js`
fn entry_candidates(root: &Path, entry: &str) -> Vec<PathBuf> {
    let base = root.join(entry);
    vec![
        base.clone(),
        PathBuf::from(format!("{}.js", base.display())),
        base.join(DEFAULT_MAIN),
    ]
}
