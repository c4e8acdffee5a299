use crate::report::RunReport;
use crate::validate::SafetyIssue;
use thiserror::Error;

/// Structured error type for pgsafesync runs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load input: {message}")]
    Load { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Safety validation failed with {} issue(s)", issues.len())]
    Validation { issues: Vec<SafetyIssue> },

    #[error("Backup failed: {message}")]
    Backup {
        message: String,
        stderr: Option<String>,
    },

    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Failed to {operation}: {message}")]
    Apply {
        operation: String,
        message: String,
        sql: Option<String>,
    },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl Error {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

/// A run that ended in a failure state. The report is always present.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: Error,
    pub report: Box<RunReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::IssueSeverity;

    #[test]
    fn validation_error_counts_issues() {
        let err = Error::Validation {
            issues: vec![SafetyIssue {
                rule: "critical_differences".to_string(),
                severity: IssueSeverity::Error,
                message: "2 critical differences".to_string(),
            }],
        };
        assert_eq!(err.to_string(), "Safety validation failed with 1 issue(s)");
    }

    #[test]
    fn apply_error_names_operation() {
        let err = Error::Apply {
            operation: "add column t2.c integer".to_string(),
            message: "relation \"t2\" does not exist".to_string(),
            sql: None,
        };
        assert_eq!(
            err.to_string(),
            "Failed to add column t2.c integer: relation \"t2\" does not exist"
        );
    }
}
