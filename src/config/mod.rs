//! `pgsafesync.toml` handling.
//!
//! ```toml
//! [environments.staging]
//! host = "db.staging.internal"
//! user = "deploy"
//! password_env = "STAGING_DB_PASSWORD"
//! database = "shop"
//!
//! [backup]
//! directory = "backups"
//! timeout_seconds = 900
//!
//! [output]
//! log_directory = "logs"
//! rollback_directory = "rollbacks"
//! ```

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "pgsafesync.toml";
pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown environment '{name}' (configured: {available})")]
    UnknownEnvironment { name: String, available: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    #[default]
    Custom,
    Plain,
}

impl BackupFormat {
    pub fn flag(&self) -> &'static str {
        match self {
            BackupFormat::Custom => "c",
            BackupFormat::Plain => "p",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            BackupFormat::Custom => "dump",
            BackupFormat::Plain => "sql",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_command")]
    pub command: String,
    #[serde(default = "default_backup_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_backup_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub format: BackupFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_rollback_directory")]
    pub rollback_directory: PathBuf,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_backup_command() -> String {
    "pg_dump".to_string()
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from("backups")
}

fn default_backup_timeout() -> u64 {
    600
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_rollback_directory() -> PathBuf {
    PathBuf::from("rollbacks")
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            command: default_backup_command(),
            directory: default_backup_directory(),
            timeout_seconds: default_backup_timeout(),
            format: BackupFormat::default(),
        }
    }
}

impl BackupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            rollback_directory: default_rollback_directory(),
        }
    }
}

/// Loads the config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

impl Config {
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig, ConfigError> {
        self.environments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEnvironment {
                name: name.to_string(),
                available: if self.environments.is_empty() {
                    "none".to_string()
                } else {
                    self.environments
                        .keys()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
    }
}

impl EnvironmentConfig {
    /// `password`, then the variable named by `password_env`, then `PGPASSWORD`.
    pub fn resolve_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| {
                self.password_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .or_else(|| std::env::var("PGPASSWORD").ok())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);
        match self.resolve_password() {
            Some(password) => options.password(&password),
            None => options,
        }
    }

    /// Connection target without credentials, for logs.
    pub fn display_target(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}
