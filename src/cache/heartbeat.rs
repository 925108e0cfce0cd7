//! Installer liveness heartbeat
//!
//! The installing process rewrites an epoch-millisecond timestamp into the
//! bundle's liveness marker every heartbeat interval. Waiters never write
//! it; they only judge whether it went stale. Once the bundle directory no
//! longer carries the installer's owner token, the heartbeat stops writing
//! and leaves the marker alone.

use crate::cache::layout::Claim;
use crate::config::Timing;
use crate::error::{DepotError, DepotResult};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Write the current time into the marker, replacing it atomically
pub async fn write_marker(path: &Path) -> DepotResult<()> {
    let tmp = scratch_path(path);
    fs::write(&tmp, now_millis().to_string())
        .await
        .map_err(|e| DepotError::io(format!("writing heartbeat {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| DepotError::io(format!("publishing heartbeat {}", path.display()), e))
}

/// Per-writer temp file next to the marker, so concurrent writers never
/// rename each other's half-written file
fn scratch_path(path: &Path) -> PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    path.with_extension(format!("{}-{}.tmp", std::process::id(), nanos))
}

/// Read the marker timestamp. Missing or unparsable markers read as `None`.
pub async fn read_marker(path: &Path) -> DepotResult<Option<i64>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content.trim().parse().ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DepotError::io(format!("reading heartbeat {}", path.display()), e)),
    }
}

/// Whole milliseconds in `duration`, saturating at `i64::MAX`
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Whether a heartbeat written at `last` is stale at `now` (both epoch ms)
pub fn is_stale_at(last: i64, now: i64, timing: &Timing) -> bool {
    let allowance = timing.heartbeat_interval.saturating_add(timing.stale_tolerance);
    now > last.saturating_add(duration_millis(allowance))
}

/// A running heartbeat owned by the installer
pub struct Heartbeat {
    claim: Claim,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Write the first beat, then keep beating in the background
    pub async fn start(claim: &Claim, timing: &Timing) -> DepotResult<Self> {
        let path = claim.bundle().heartbeat_path();
        write_marker(&path).await?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let interval = timing.heartbeat_interval;
        let task_claim = claim.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if !task_claim.is_held().await {
                            debug!("Bundle {} changed owner, heartbeat stopped", task_claim.bundle().key());
                            break;
                        }
                        if let Err(e) = write_marker(&path).await {
                            debug!("Heartbeat write failed: {}", e);
                        }
                    }
                }
            }
        });

        debug!("Heartbeat started for bundle {}", claim.bundle().key());
        Ok(Self {
            claim: claim.clone(),
            stop_tx,
            task,
        })
    }

    /// Stop beating and remove the marker, unless the bundle changed owner
    pub async fn stop(self) -> DepotResult<()> {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;

        let bundle = self.claim.bundle();
        if !self.claim.is_held().await {
            debug!("Bundle {} changed owner, leaving its heartbeat", bundle.key());
            return Ok(());
        }

        let path = bundle.heartbeat_path();
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DepotError::io(
                    format!("removing heartbeat {}", path.display()),
                    e,
                ))
            }
        }

        debug!("Heartbeat stopped for bundle {}", bundle.key());
        Ok(())
    }
}

/// Verdict of a liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Stale,
}

/// Staleness tracker for one waiter.
///
/// A missing marker is only declared stale once it has stayed missing for
/// `max_creation_delay`, counted from this waiter's own first observation.
#[derive(Debug, Default)]
pub struct LivenessProbe {
    first_missing: Option<Instant>,
}

impl LivenessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the marker and judge it
    pub async fn check(&mut self, path: &Path, timing: &Timing) -> DepotResult<Liveness> {
        let marker = read_marker(path).await?;
        Ok(self.assess(marker, now_millis(), Instant::now(), timing))
    }

    /// Judge an already-read marker value
    pub fn assess(
        &mut self,
        marker: Option<i64>,
        now_ms: i64,
        now: Instant,
        timing: &Timing,
    ) -> Liveness {
        match marker {
            Some(last) => {
                self.first_missing = None;
                if is_stale_at(last, now_ms, timing) {
                    Liveness::Stale
                } else {
                    Liveness::Alive
                }
            }
            None => {
                let first = *self.first_missing.get_or_insert(now);
                if now.duration_since(first) > timing.max_creation_delay {
                    Liveness::Stale
                } else {
                    Liveness::Alive
                }
            }
        }
    }
}
