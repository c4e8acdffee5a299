//! Pre-apply database backup through an external dump command.

use crate::config::{BackupConfig, BackupFormat, EnvironmentConfig};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to start backup command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup command exited with {status}")]
    Failed { status: String, stderr: String },

    #[error("Backup did not finish within {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("Backup command succeeded but produced no file at {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Failed to prepare backup directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            BackupError::Failed { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BackupRunner {
    command: String,
    directory: PathBuf,
    timeout: Duration,
    format: BackupFormat,
}

impl BackupRunner {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            command: config.command.clone(),
            directory: config.directory.clone(),
            timeout: config.timeout(),
            format: config.format,
        }
    }

    /// `<directory>/<database>_<environment>_<stamp>.<ext>`
    pub fn destination(&self, database: &str, environment: &str, stamp: &str) -> PathBuf {
        self.directory.join(format!(
            "{database}_{environment}_{stamp}.{}",
            self.format.extension()
        ))
    }

    pub async fn run(
        &self,
        target: &EnvironmentConfig,
        destination: &Path,
    ) -> Result<BackupArtifact, BackupError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BackupError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut command = Command::new(&self.command);
        command
            .arg("-h")
            .arg(&target.host)
            .arg("-p")
            .arg(target.port.to_string())
            .arg("-U")
            .arg(&target.user)
            .arg("-d")
            .arg(&target.database)
            .arg("-F")
            .arg(self.format.flag())
            .arg("-f")
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = target.resolve_password() {
            command.env("PGPASSWORD", password);
        }

        tracing::info!(
            command = %self.command,
            target = %target.display_target(),
            destination = %destination.display(),
            "starting backup"
        );

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| BackupError::Spawn {
                command: self.command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(BackupError::TimedOut {
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(BackupError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let metadata = std::fs::metadata(destination).map_err(|_| BackupError::MissingArtifact {
            path: destination.to_path_buf(),
        })?;

        tracing::info!(size_bytes = metadata.len(), "backup complete");
        Ok(BackupArtifact {
            path: destination.to_path_buf(),
            size_bytes: metadata.len(),
        })
    }
}
