//! Bundle manifest (`package.json`) handed to the package manager
//!
//! Single-package bundles declare their package as a regular dependency so
//! a failure is a hard install failure. Multi-package bundles declare
//! everything as optional, so one bad name does not sink its neighbours.

use crate::cache::key::{PackageSet, PackageSpec};
use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Dependency declaration written into every bundle directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub private: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Build the manifest for a canonical package set
    pub fn for_set(set: &PackageSet) -> Self {
        let deps: BTreeMap<String, String> = set
            .specs()
            .iter()
            .map(|s| (s.name.clone(), s.version.clone()))
            .collect();

        let (dependencies, optional_dependencies) = if set.is_single() {
            (deps, BTreeMap::new())
        } else {
            (BTreeMap::new(), deps)
        };

        Self {
            name: format!("depot-bundle-{}", set.key()),
            version: "0.0.0".to_string(),
            private: true,
            dependencies,
            optional_dependencies,
        }
    }

    /// Every declared package, in name order
    pub fn packages(&self) -> Vec<PackageSpec> {
        let mut specs: Vec<PackageSpec> = self
            .dependencies
            .iter()
            .chain(self.optional_dependencies.iter())
            .map(|(name, version)| PackageSpec::new(name.clone(), Some(version.as_str())))
            .collect();
        specs.sort();
        specs
    }

    /// Write the manifest as pretty JSON
    pub async fn write(&self, path: &Path) -> DepotResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| DepotError::io(format!("writing manifest {}", path.display()), e))
    }

    /// Load a manifest from disk
    pub async fn load(path: &Path) -> DepotResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DepotError::io(format!("reading manifest {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}
