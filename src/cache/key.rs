//! Package list canonicalization and bundle keys
//!
//! Turns an unordered list of requested packages plus a pin map into a
//! canonical package set. Same effective set = same key, regardless of
//! order, duplicates or sub-path imports.

use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Version constraint meaning "any version"
pub const ANY_VERSION: &str = "*";

/// Bytes of the SHA256 digest kept in a bundle key
const KEY_BYTES: usize = 16;

/// Explicit version pins, package name -> version constraint
pub type VersionPins = BTreeMap<String, String>;

/// Extract the package name from an import identifier.
///
/// `lodash/fp` -> `lodash`, `@babel/core/lib/parse` -> `@babel/core`.
/// Returns `None` for identifiers that cannot name a package.
pub fn package_name(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let name = if let Some(rest) = raw.strip_prefix('@') {
        let mut parts = rest.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        if scope.is_empty() || name.is_empty() {
            return None;
        }
        &raw[..scope.len() + name.len() + 2]
    } else {
        raw.split('/').next()?
    };

    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.chars().any(|c| c.is_whitespace() || c == '\\');
    valid.then_some(name)
}

/// Split a `name@version` argument into name and optional version.
///
/// The leading `@` of a scoped name is not a separator.
pub fn split_version(arg: &str) -> (&str, Option<&str>) {
    let offset = usize::from(arg.starts_with('@'));
    match arg[offset..].find('@') {
        Some(i) => {
            let at = i + offset;
            let version = &arg[at + 1..];
            (&arg[..at], (!version.is_empty()).then_some(version))
        }
        None => (arg, None),
    }
}

/// Split CLI-style `name[@version]` arguments into a raw list and pins
pub fn parse_requests<S: AsRef<str>>(args: &[S]) -> (Vec<String>, VersionPins) {
    let mut raw = Vec::with_capacity(args.len());
    let mut pins = VersionPins::new();

    for arg in args {
        let (name, version) = split_version(arg.as_ref());
        if let (Some(version), Some(package)) = (version, package_name(name)) {
            pins.insert(package.to_string(), version.to_string());
        }
        raw.push(name.to_string());
    }

    (raw, pins)
}

/// A package with its effective version constraint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name, without sub-path
    pub name: String,
    /// Version constraint, `*` when unconstrained
    pub version: String,
}

impl PackageSpec {
    /// Create a spec, using `*` when no version is given
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.unwrap_or(ANY_VERSION).to_string(),
        }
    }

    /// Whether a concrete constraint was declared
    pub fn is_pinned(&self) -> bool {
        self.version != ANY_VERSION
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Content-derived identifier of a bundle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleKey(String);

impl BundleKey {
    /// Key as a string (also the bundle directory name)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recognize a bundle directory name
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let valid = name.len() == KEY_BYTES * 2 && name.chars().all(|c| c.is_ascii_hexdigit());
        valid.then(|| Self(name.to_string()))
    }

    fn digest(canonical: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..KEY_BYTES]))
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical, deduplicated, sorted package set and its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSet {
    specs: Vec<PackageSpec>,
    key: BundleKey,
}

impl PackageSet {
    /// Canonicalize raw identifiers against the pin map
    pub fn resolve<S: AsRef<str>>(raw: &[S], versions: &VersionPins) -> DepotResult<Self> {
        let mut effective: BTreeMap<&str, &str> = BTreeMap::new();

        for item in raw {
            let item = item.as_ref();
            let name = package_name(item).ok_or_else(|| DepotError::InvalidPackage(item.to_string()))?;
            let version = versions.get(name).map(String::as_str).unwrap_or(ANY_VERSION);
            effective.insert(name, version);
        }

        if effective.is_empty() {
            return Err(DepotError::InvalidPackage("(empty package list)".to_string()));
        }

        let specs: Vec<PackageSpec> = effective
            .into_iter()
            .map(|(name, version)| PackageSpec::new(name, Some(version)))
            .collect();

        Ok(Self::from_sorted(specs))
    }

    /// Dedicated single-package set for `name`
    pub fn single(name: &str, versions: &VersionPins) -> DepotResult<Self> {
        Self::resolve(&[name], versions)
    }

    fn from_sorted(specs: Vec<PackageSpec>) -> Self {
        let canonical = specs
            .iter()
            .map(PackageSpec::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let key = BundleKey::digest(&canonical);
        Self { specs, key }
    }

    /// Packages in canonical order
    pub fn specs(&self) -> &[PackageSpec] {
        &self.specs
    }

    /// Package names in canonical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// The bundle key
    pub fn key(&self) -> &BundleKey {
        &self.key
    }

    /// Whether this is a single-package bundle
    pub fn is_single(&self) -> bool {
        self.specs.len() == 1
    }

    /// Whether `name` is part of this set
    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .specs
            .iter()
            .map(PackageSpec::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pins(pairs: &[(&str, &str)]) -> VersionPins {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn package_name_strips_subpath() {
        assert_eq!(package_name("lodash"), Some("lodash"));
        assert_eq!(package_name("lodash/fp/map"), Some("lodash"));
        assert_eq!(package_name("@babel/core"), Some("@babel/core"));
        assert_eq!(package_name("@babel/core/lib/parse"), Some("@babel/core"));
    }

    #[test]
    fn package_name_rejects_paths() {
        assert_eq!(package_name(""), None);
        assert_eq!(package_name("@scope"), None);
        assert_eq!(package_name("@/x"), None);
        assert_eq!(package_name("./local"), None);
        assert_eq!(package_name("../escape"), None);
        assert_eq!(package_name("has space"), None);
    }

    #[test]
    fn split_version_handles_scopes() {
        assert_eq!(split_version("chalk"), ("chalk", None));
        assert_eq!(split_version("chalk@^5.0.0"), ("chalk", Some("^5.0.0")));
        assert_eq!(split_version("@types/node"), ("@types/node", None));
        assert_eq!(split_version("@types/node@20"), ("@types/node", Some("20")));
        assert_eq!(split_version("chalk@"), ("chalk", None));
    }

    #[test]
    fn parse_requests_collects_pins() {
        let (raw, pins) = parse_requests(&["chalk@5.3.0", "lodash/fp", "@scope/pkg@1"]);
        assert_eq!(raw, vec!["chalk", "lodash/fp", "@scope/pkg"]);
        assert_eq!(pins.get("chalk").map(String::as_str), Some("5.3.0"));
        assert_eq!(pins.get("@scope/pkg").map(String::as_str), Some("1"));
        assert!(!pins.contains_key("lodash"));
    }

    #[test]
    fn key_is_order_independent() {
        let versions = pins(&[("dedupe", "4.0.2")]);
        let orders: [[&str; 3]; 6] = [
            ["chalk", "dedupe", "username"],
            ["chalk", "username", "dedupe"],
            ["dedupe", "chalk", "username"],
            ["dedupe", "username", "chalk"],
            ["username", "chalk", "dedupe"],
            ["username", "dedupe", "chalk"],
        ];

        let first = PackageSet::resolve(&orders[0], &versions).unwrap();
        for order in &orders[1..] {
            let set = PackageSet::resolve(order, &versions).unwrap();
            assert_eq!(set.key(), first.key());
            assert_eq!(set.specs(), first.specs());
        }
    }

    #[test]
    fn key_ignores_duplicates_and_subpaths() {
        let versions = VersionPins::new();
        let a = PackageSet::resolve(&["lodash", "lodash/fp", "lodash"], &versions).unwrap();
        let b = PackageSet::resolve(&["lodash"], &versions).unwrap();
        assert_eq!(a.key(), b.key());
        assert!(a.is_single());
    }

    #[test]
    fn pins_change_the_key() {
        let free = PackageSet::resolve(&["chalk"], &VersionPins::new()).unwrap();
        let pinned = PackageSet::resolve(&["chalk"], &pins(&[("chalk", "5.3.0")])).unwrap();
        assert_ne!(free.key(), pinned.key());
        assert_eq!(pinned.specs()[0].to_string(), "chalk@5.3.0");
        assert!(pinned.specs()[0].is_pinned());
        assert!(!free.specs()[0].is_pinned());
    }

    #[test]
    fn specs_are_sorted() {
        let set = PackageSet::resolve(&["zod", "@types/node", "axios"], &VersionPins::new()).unwrap();
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["@types/node", "axios", "zod"]);
        assert!(set.contains("zod"));
        assert!(!set.contains("react"));
    }

    #[test]
    fn empty_or_invalid_lists_are_rejected() {
        let empty: [&str; 0] = [];
        assert!(PackageSet::resolve(&empty, &VersionPins::new()).is_err());
        assert!(matches!(
            PackageSet::resolve(&["ok", "./nope"], &VersionPins::new()),
            Err(DepotError::InvalidPackage(name)) if name == "./nope"
        ));
    }

    #[test]
    fn bundle_key_round_trips_through_dir_name() {
        let set = PackageSet::single("left-pad", &VersionPins::new()).unwrap();
        let key = set.key();
        assert_eq!(key.as_str().len(), KEY_BYTES * 2);
        assert_eq!(BundleKey::from_dir_name(key.as_str()).as_ref(), Some(key));
        assert!(BundleKey::from_dir_name("errors.log").is_none());
    }
}
