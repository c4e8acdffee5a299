use crate::diff::{PhaseKind, SyncOp};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Run lifecycle. Success states only move forward; failure states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Started,
    Loaded,
    Validated,
    BackedUp,
    Planned,
    Applied,
    DryRun,
    RollbackScriptWritten,
    Reported,
    LoadFailed,
    ValidationFailed,
    BackupFailed,
    ApplyFailed,
}

impl RunState {
    fn step(&self) -> Option<u8> {
        match self {
            RunState::Started => Some(0),
            RunState::Loaded => Some(1),
            RunState::Validated => Some(2),
            RunState::BackedUp => Some(3),
            RunState::Planned => Some(4),
            RunState::Applied | RunState::DryRun => Some(5),
            RunState::RollbackScriptWritten => Some(6),
            RunState::Reported => Some(7),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.step().is_none()
    }

    pub fn can_advance_to(&self, next: RunState) -> bool {
        let Some(current) = self.step() else {
            return false;
        };
        match next {
            RunState::LoadFailed => *self == RunState::Started,
            RunState::ValidationFailed => *self == RunState::Loaded,
            RunState::BackupFailed => *self == RunState::Validated,
            RunState::ApplyFailed => *self == RunState::Planned,
            _ => next.step().is_some_and(|step| step > current),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounters {
    pub sequences_created: usize,
    pub tables_created: usize,
    pub columns_added: usize,
    pub indexes_created: usize,
    pub constraints_added: usize,
    pub constraints_failed: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl SyncCounters {
    pub fn record(&mut self, op: &SyncOp) {
        match op.phase() {
            PhaseKind::Sequences => self.sequences_created += 1,
            PhaseKind::Tables => self.tables_created += 1,
            PhaseKind::Columns => self.columns_added += 1,
            PhaseKind::Indexes => self.indexes_created += 1,
            PhaseKind::Constraints => self.constraints_added += 1,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.sequences_created
            + self.tables_created
            + self.columns_added
            + self.indexes_created
            + self.constraints_added
    }

    /// Adds the change counts of `other`; warnings and errors are tracked by the report.
    pub fn merge_changes(&mut self, other: &SyncCounters) {
        self.sequences_created += other.sequences_created;
        self.tables_created += other.tables_created;
        self.columns_added += other.columns_added;
        self.indexes_created += other.indexes_created;
        self.constraints_added += other.constraints_added;
        self.constraints_failed += other.constraints_failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Dry run: described, not executed.
    Planned,
    Applied,
    /// Constraint that failed and was skipped.
    SoftFailed,
    Failed,
    /// Executed, then undone by the transaction rollback.
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub phase: PhaseKind,
    pub description: String,
    pub statements: Vec<String>,
    pub status: OperationStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub environment: String,
    pub database: Option<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub history: Vec<RunState>,
    pub counters: SyncCounters,
    pub validation_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub operations: Vec<OperationOutcome>,
    pub log_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub rollback_path: Option<PathBuf>,
}

impl RunReport {
    pub fn new(environment: &str, dry_run: bool) -> Self {
        Self {
            environment: environment.to_string(),
            database: None,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Started,
            history: vec![RunState::Started],
            counters: SyncCounters::default(),
            validation_issues: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            operations: Vec::new(),
            log_path: None,
            backup_path: None,
            rollback_path: None,
        }
    }

    /// Moves to `next`. Invalid transitions are logged and ignored.
    pub fn advance(&mut self, next: RunState) {
        if !self.state.can_advance_to(next) {
            tracing::error!(from = ?self.state, to = ?next, "invalid run state transition");
            return;
        }
        tracing::debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
        self.history.push(next);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
        self.counters.warnings += 1;
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.errors.push(message);
        self.counters.errors += 1;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        !self.state.is_failure() && self.errors.is_empty()
    }

    /// "would create 1 table(s), ..." for dry runs, "created ..." otherwise.
    pub fn summary_line(&self) -> String {
        let c = &self.counters;
        if self.dry_run {
            format!(
                "would create {} sequence(s), create {} table(s), add {} column(s), create {} index(es), create {} constraint(s)",
                c.sequences_created, c.tables_created, c.columns_added, c.indexes_created, c.constraints_added
            )
        } else {
            format!(
                "created {} sequence(s), created {} table(s), added {} column(s), created {} index(es), added {} constraint(s), {} constraint(s) failed",
                c.sequences_created,
                c.tables_created,
                c.columns_added,
                c.indexes_created,
                c.constraints_added,
                c.constraints_failed
            )
        }
    }
}

pub fn generate_text_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str("=== pgsafesync run ===\n");
    output.push_str(&format!("Environment: {}\n", report.environment));
    if let Some(ref database) = report.database {
        output.push_str(&format!("Database: {database}\n"));
    }
    output.push_str(&format!(
        "Mode: {}\n",
        if report.dry_run { "dry run" } else { "apply" }
    ));
    output.push_str(&format!("State: {:?}\n", report.state));
    output.push('\n');

    output.push_str(&format!("Result: {}\n", report.summary_line()));

    if !report.operations.is_empty() {
        output.push('\n');
        output.push_str("Operations:\n");
        for outcome in &report.operations {
            let marker = match outcome.status {
                OperationStatus::Planned => "plan",
                OperationStatus::Applied => "ok",
                OperationStatus::SoftFailed => "skip",
                OperationStatus::Failed => "FAIL",
                OperationStatus::RolledBack => "undone",
            };
            output.push_str(&format!("  [{marker:>6}] {}\n", outcome.description));
            if let Some(ref error) = outcome.error {
                output.push_str(&format!("           {error}\n"));
            }
        }
    }

    if !report.validation_issues.is_empty() {
        output.push('\n');
        output.push_str("Validation issues:\n");
        for issue in &report.validation_issues {
            output.push_str(&format!("  - {issue}\n"));
        }
    }

    if !report.warnings.is_empty() {
        output.push('\n');
        output.push_str(&format!("Warnings ({}):\n", report.warnings.len()));
        for warning in &report.warnings {
            output.push_str(&format!("  - {warning}\n"));
        }
    }

    if !report.errors.is_empty() {
        output.push('\n');
        output.push_str(&format!("Errors ({}):\n", report.errors.len()));
        for error in &report.errors {
            output.push_str(&format!("  - {error}\n"));
        }
    }

    output.push('\n');
    for (label, path) in [
        ("Log", &report.log_path),
        ("Backup", &report.backup_path),
        ("Rollback script", &report.rollback_path),
    ] {
        if let Some(path) = path {
            output.push_str(&format!("{label}: {}\n", path.display()));
        }
    }

    output
}
