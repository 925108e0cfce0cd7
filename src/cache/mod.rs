//! Shared bundle cache
//!
//! Packages are installed into bundles: one directory per canonical
//! package list, named by the list's content hash. Any number of
//! processes may ask for the same bundle at once; exactly one installs it
//! and the rest wait on markers inside the directory.
//!
//! # Bundle States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Absent | nothing | Next caller becomes the installer |
//! | Installing | dir + owner + fresh heartbeat | Someone is installing, wait |
//! | Ready | dir + index.json | Safe to use, never modified again |
//! | Abandoned | dir, stale or no heartbeat | Installer died or failed, reclaim |

pub mod errlog;
pub mod facade;
pub mod heartbeat;
pub mod index;
pub mod installer;
pub mod key;
pub mod layout;
pub mod manifest;
pub mod pins;
pub mod protocol;

pub use facade::{BundleCache, PreloadLauncher};
pub use index::{BundleIndex, ExportKind, PackageExport, PackageResolver};
pub use key::{parse_requests, BundleKey, PackageSet, PackageSpec, VersionPins};
pub use layout::{BundleDir, BundleInfo, BundleState, Claim, StoreLayout};
pub use protocol::{Acquisition, Coordinator};
