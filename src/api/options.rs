use crate::config::{Config, DEFAULT_ENVIRONMENT};
use std::path::PathBuf;

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Schema comparison document
    pub diff_path: PathBuf,
    /// Source-schema companion document; derived from the comparison when unset
    pub source_schema_path: Option<PathBuf>,
    /// Named target environment from the config
    pub environment: String,
    pub config: Config,
    /// Describe the plan without connecting (default: true)
    pub dry_run: bool,
    /// Take a backup before applying (default: true)
    pub backup: bool,
    pub include_sequences: bool,
    pub include_indexes: bool,
    pub include_constraints: bool,
    /// Proceed despite safety validation errors
    pub force: bool,
    /// Run log the final report is appended to
    pub log_path: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            diff_path: PathBuf::new(),
            source_schema_path: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            config: Config::default(),
            dry_run: true,
            backup: true,
            include_sequences: true,
            include_indexes: true,
            include_constraints: true,
            force: false,
            log_path: None,
        }
    }
}

impl SyncOptions {
    /// Dry-run options for a comparison document.
    pub fn new(diff_path: impl Into<PathBuf>) -> Self {
        Self {
            diff_path: diff_path.into(),
            ..Default::default()
        }
    }

    /// Execute the plan against the configured environment.
    pub fn apply(mut self) -> Self {
        self.dry_run = false;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_source_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_schema_path = Some(path.into());
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }

    pub fn without_sequences(mut self) -> Self {
        self.include_sequences = false;
        self
    }

    pub fn without_indexes(mut self) -> Self {
        self.include_indexes = false;
        self
    }

    pub fn without_constraints(mut self) -> Self {
        self.include_constraints = false;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}
