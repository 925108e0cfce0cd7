//! Package manager backed by an external executable
//!
//! Runs e.g. `npm install` with the bundle directory as working directory.
//! Standard error is streamed line by line into the shared error log, with
//! invalid UTF-8 replaced. The child is always waited for, and exit code 0
//! is the only success signal.

use crate::cache::errlog::ErrorLog;
use crate::cache::key::PackageSet;
use crate::cache::layout::BundleDir;
use crate::config::InstallerConfig;
use crate::error::{DepotError, DepotResult};
use crate::package_manager::{error_tail, PackageManager};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Package manager that shells out to a configured command
#[derive(Debug, Clone)]
pub struct CommandPackageManager {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandPackageManager {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    async fn install(
        &self,
        bundle: &BundleDir,
        set: &PackageSet,
        errors: &ErrorLog,
    ) -> DepotResult<()> {
        let command_line = self.command_line();
        let tag = bundle.key().to_string();
        debug!("Executing in {}: {}", bundle.path().display(), command_line);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .current_dir(bundle.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DepotError::command_failed(&command_line, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DepotError::Internal("installer stderr not captured".to_string()))?;

        let mut reader = BufReader::new(stderr);
        let mut captured = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    errors.append(&tag, &line).await;
                    captured.push(line);
                }
                Err(e) => {
                    debug!("Stopped reading output of {}: {}", command_line, e);
                    break;
                }
            }
        }
        // Closing our end lets a still-writing child fail instead of block
        drop(reader);

        let status = child
            .wait()
            .await
            .map_err(|e| DepotError::io(format!("waiting for {}", command_line), e))?;

        if status.success() {
            info!("Installed [{}] with {}", set, self.program);
            return Ok(());
        }

        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "killed by signal".to_string());
        errors
            .append(&tag, &format!("`{}` exited with {} for [{}]", command_line, code, set))
            .await;

        Err(DepotError::InstallFailed {
            packages: set.to_string(),
            code,
            detail: error_tail(&captured),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}
