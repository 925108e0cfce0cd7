//! Depot - shared package bundle cache
//!
//! Installs the packages scripts depend on into content-addressed bundles
//! and coordinates concurrent installers through the filesystem alone.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod package_manager;

pub use error::{DepotError, DepotResult};
