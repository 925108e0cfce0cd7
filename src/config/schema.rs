//! Configuration schema for Depot
//!
//! Configuration is stored at `~/.config/depot/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Bundle cache settings
    pub cache: CacheConfig,

    /// Package manager invocation
    pub installer: InstallerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Bundle cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (defaults to the platform cache directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// How often an installer rewrites its liveness marker
    pub heartbeat_interval_ms: u64,

    /// Slack allowed on top of the interval before a marker counts as stale
    pub stale_tolerance_ms: u64,

    /// How long a waiter tolerates a missing liveness marker
    pub max_creation_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            heartbeat_interval_ms: 1000,
            stale_tolerance_ms: 500,
            max_creation_delay_ms: 500,
        }
    }
}

impl CacheConfig {
    /// Protocol timing derived from this section
    pub fn timing(&self) -> Timing {
        Timing {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            stale_tolerance: Duration::from_millis(self.stale_tolerance_ms),
            max_creation_delay: Duration::from_millis(self.max_creation_delay_ms),
        }
    }
}

/// Timing constants of the acquisition protocol.
///
/// These are empirical heuristics. Slow or network filesystems may need
/// larger values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Heartbeat write period, also the waiter poll period
    pub heartbeat_interval: Duration,
    /// Jitter allowance for heartbeat writes
    pub stale_tolerance: Duration,
    /// Grace period for an installer that has not written its first heartbeat
    pub max_creation_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        CacheConfig::default().timing()
    }
}

/// Package manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Executable to run inside the bundle directory
    pub command: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables for the subprocess
    pub env: BTreeMap<String, String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
            args: vec![
                "install".to_string(),
                "--no-audit".to_string(),
                "--no-fund".to_string(),
                "--loglevel=error".to_string(),
            ],
            env: BTreeMap::new(),
        }
    }
}
