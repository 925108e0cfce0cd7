//! Shared installer error log
//!
//! Append-only, process-wide and not bundle-scoped: every installer in
//! every process appends timestamped lines to `<root>/errors.log`.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Appends timestamped installer diagnostics
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line tagged with the bundle it came from.
    ///
    /// IO failures are logged and dropped; a broken log must not fail an
    /// install.
    pub async fn append(&self, bundle: &str, line: &str) {
        self.append_lines(bundle, std::iter::once(line)).await;
    }

    /// Append several lines in one write
    pub async fn append_lines<'a>(&self, bundle: &str, lines: impl IntoIterator<Item = &'a str>) {
        let stamp = Utc::now().to_rfc3339();
        let mut buf = String::new();
        for line in lines {
            buf.push_str(&format!("{stamp} [{bundle}] {line}\n"));
        }
        if buf.is_empty() {
            return;
        }

        if let Err(e) = self.write(&buf).await {
            warn!("Failed to write error log {}: {}", self.path.display(), e);
        }
    }

    async fn write(&self, content: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let log = ErrorLog::new(dir.path().join("nested").join("errors.log"));

        log.append("abc123", "npm ERR! 404 not found").await;
        log.append_lines("def456", ["first", "second"]).await;

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[abc123] npm ERR! 404 not found"));
        assert!(lines[2].ends_with("[def456] second"));

        let stamp = lines[0].split(' ').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn empty_batch_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));

        log.append_lines("abc", std::iter::empty()).await;
        assert!(!log.path().exists());
    }
}
