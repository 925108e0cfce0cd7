//! Exact versions installed in a ready bundle
//!
//! Reads the package manager's own lock information so callers can pin
//! what was actually resolved back into their script headers.

use crate::cache::index::BundleIndex;
use crate::cache::key::{PackageSet, VersionPins};
use crate::cache::layout::BundleDir;
use crate::error::{DepotError, DepotResult};
use serde_json::Value;
use std::io::ErrorKind;
use tokio::fs;
use tracing::debug;

/// Exact versions of the requested packages installed in `bundle`
pub async fn installed_versions(bundle: &BundleDir, set: &PackageSet) -> DepotResult<VersionPins> {
    let lock_path = bundle.lockfile_path();
    let from_lock = match fs::read_to_string(&lock_path).await {
        Ok(content) => {
            let lock: Value = serde_json::from_str(&content)?;
            Some(lock)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(DepotError::io(
                format!("reading {}", lock_path.display()),
                e,
            ))
        }
    };

    let candidates: VersionPins = match from_lock {
        Some(lock) => set
            .names()
            .filter_map(|name| lock_version(&lock, name).map(|v| (name.to_string(), v.to_string())))
            .collect(),
        None => {
            debug!("No lockfile in bundle {}, using index versions", bundle.key());
            let index = BundleIndex::load(bundle).await?;
            index
                .versions()
                .into_iter()
                .filter(|(name, _)| set.contains(name))
                .collect()
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|(_, version)| semver::Version::parse(version).is_ok())
        .collect())
}

/// Version of a top-level package in an npm lockfile (v1, v2 or v3)
fn lock_version<'a>(lock: &'a Value, name: &str) -> Option<&'a str> {
    lock.get("packages")
        .and_then(|p| p.get(format!("node_modules/{name}")))
        .or_else(|| lock.get("dependencies").and_then(|d| d.get(name)))
        .and_then(|entry| entry.get("version"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::layout::StoreLayout;
    use serde_json::json;
    use tempfile::TempDir;

    async fn ready_bundle(dir: &TempDir, names: &[&str]) -> (BundleDir, PackageSet) {
        let set = PackageSet::resolve(names, &VersionPins::new()).unwrap();
        let bundle = StoreLayout::new(dir.path()).bundle(set.key());
        bundle.try_create().await.unwrap();
        (bundle, set)
    }

    #[tokio::test]
    async fn reads_v3_lockfile() {
        let dir = TempDir::new().unwrap();
        let (bundle, set) = ready_bundle(&dir, &["chalk", "@types/node"]).await;
        let lock = json!({
            "lockfileVersion": 3,
            "packages": {
                "": {"optionalDependencies": {"chalk": "*", "@types/node": "*"}},
                "node_modules/chalk": {"version": "5.3.0"},
                "node_modules/@types/node": {"version": "20.11.5"},
                "node_modules/ansi-styles": {"version": "6.2.1"}
            }
        });
        std::fs::write(bundle.lockfile_path(), lock.to_string()).unwrap();

        let pins = installed_versions(&bundle, &set).await.unwrap();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins["chalk"], "5.3.0");
        assert_eq!(pins["@types/node"], "20.11.5");
    }

    #[tokio::test]
    async fn reads_v1_lockfile_and_skips_non_semver() {
        let dir = TempDir::new().unwrap();
        let (bundle, set) = ready_bundle(&dir, &["left-pad", "from-git"]).await;
        let lock = json!({
            "lockfileVersion": 1,
            "dependencies": {
                "left-pad": {"version": "1.3.0"},
                "from-git": {"version": "github:user/from-git#abc123"}
            }
        });
        std::fs::write(bundle.lockfile_path(), lock.to_string()).unwrap();

        let pins = installed_versions(&bundle, &set).await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins["left-pad"], "1.3.0");
    }

    #[tokio::test]
    async fn falls_back_to_index() {
        let dir = TempDir::new().unwrap();
        let (bundle, set) = ready_bundle(&dir, &["left-pad"]).await;
        let pkg = bundle.modules_dir().join("left-pad");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("package.json"), r#"{"version": "1.3.0"}"#).unwrap();
        BundleIndex::build(&bundle, &set)
            .await
            .unwrap()
            .publish(&bundle)
            .await
            .unwrap();

        let pins = installed_versions(&bundle, &set).await.unwrap();
        assert_eq!(pins["left-pad"], "1.3.0");
    }
}
