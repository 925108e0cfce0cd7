//! Error types for Depot
//!
//! All modules use `DepotResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Depot operations
pub type DepotResult<T> = Result<T, DepotError>;

/// All errors that can occur in Depot
#[derive(Error, Debug)]
pub enum DepotError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Package errors
    #[error("Invalid package identifier: '{0}'")]
    InvalidPackage(String),

    #[error("Install failed for [{packages}] (exit code: {code}): {detail}")]
    InstallFailed {
        packages: String,
        code: String,
        detail: String,
    },

    #[error("Package '{name}' is not available in bundle {key}")]
    PackageNotInBundle { name: String, key: String },

    #[error("Bundle index {path} is unreadable: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Bundle {key} was removed and recreated by another caller during install")]
    BundleLost { key: String },

    #[error("Could not load package '{name}': it failed to install or resolve even in a dedicated bundle")]
    PackageUnavailable { name: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the facade may recover by retrying in a dedicated bundle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InstallFailed { .. } | Self::PackageNotInBundle { .. } | Self::IndexCorrupt { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PackageUnavailable { .. } => Some(
                "Check the package name for typos and your network connection. \
                 Installer output is recorded in errors.log under the cache directory.",
            ),
            Self::InstallFailed { .. } => {
                Some("See errors.log under the cache directory for the installer output")
            }
            Self::CommandFailed { .. } => {
                Some("Is the package manager installed? Set [installer] command in the config")
            }
            _ => None,
        }
    }
}
