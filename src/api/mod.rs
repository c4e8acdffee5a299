//! High-level entry point for running a sync from Rust code.
//!
//! [`sync`] drives one run through its lifecycle: load, validate, back up,
//! plan, apply (or describe), write the rollback script, report. Every
//! outcome, including failures, carries a [`RunReport`].
//!
//! # Example
//!
//! ```no_run
//! use pgsafesync::api::{sync_blocking, SyncOptions};
//!
//! let report = sync_blocking(SyncOptions::new("comparison.json")).unwrap();
//! println!("{}", report.summary_line());
//! ```
//!
//! The blocking variant creates a new tokio runtime per call.

mod error;
mod options;

pub use error::{Error, RunFailure};
pub use options::SyncOptions;

use crate::apply::{dry_run_plan, execute_plan};
use crate::backup::BackupRunner;
use crate::config::EnvironmentConfig;
use crate::diff::planner::{plan_sync, PlanOptions};
use crate::logging::append_to_log;
use crate::model::loader::{companion_path, load_comparison, load_source_schema};
use crate::model::{SchemaComparison, SourceSchema};
use crate::pg::connection::PgConnection;
use crate::pg::introspect::{snapshot_catalog, CatalogSnapshot};
use crate::report::{generate_text_report, RunReport, RunState};
use crate::rollback::{RollbackHeader, RollbackScript};
use crate::util::redact_url;
use crate::validate::validate_comparison;

/// Runs one sync. `Err` always carries the report of the failed run.
pub async fn sync(options: SyncOptions) -> Result<RunReport, RunFailure> {
    let mut report = RunReport::new(&options.environment, options.dry_run);
    report.log_path = options.log_path.clone();
    let stamp = report.started_at.format("%Y%m%d_%H%M%S").to_string();

    tracing::info!(
        diff = %options.diff_path.display(),
        environment = %options.environment,
        mode = if options.dry_run { "dry-run" } else { "apply" },
        "starting sync"
    );

    // Apply mode needs a target; dry runs only borrow its schema name when configured.
    let target = if options.dry_run {
        options.config.environments.get(&options.environment).cloned()
    } else {
        match options.config.environment(&options.environment) {
            Ok(env) => Some(env.clone()),
            Err(e) => {
                return Err(fail(
                    report,
                    RunState::LoadFailed,
                    Error::config(e.to_string()),
                ))
            }
        }
    };

    let (comparison, source) = match load_inputs(&options, &mut report) {
        Ok(inputs) => inputs,
        Err(e) => return Err(fail(report, RunState::LoadFailed, e)),
    };
    report.database = target
        .as_ref()
        .map(|t| t.database.clone())
        .or_else(|| comparison.metadata.target.database.clone());
    report.advance(RunState::Loaded);

    let validation = validate_comparison(&comparison);
    for warning in &validation.warnings {
        report.warn(warning.to_string());
    }
    report.validation_issues = validation.issue_messages();
    if !validation.ok {
        if options.force {
            for issue in &validation.issues {
                report.warn(format!("Proceeding despite {issue} (--force)"));
            }
        } else {
            return Err(fail(
                report,
                RunState::ValidationFailed,
                Error::Validation {
                    issues: validation.issues,
                },
            ));
        }
    }
    report.advance(RunState::Validated);

    if let Some(target) = target.as_ref().filter(|_| !options.dry_run) {
        if options.backup {
            let runner = BackupRunner::from_config(&options.config.backup);
            let destination = runner.destination(&target.database, &options.environment, &stamp);
            match runner.run(target, &destination).await {
                Ok(artifact) => {
                    report.backup_path = Some(artifact.path);
                    report.advance(RunState::BackedUp);
                }
                Err(e) => {
                    let error = Error::Backup {
                        message: e.to_string(),
                        stderr: e.stderr().map(str::to_string),
                    };
                    return Err(fail(report, RunState::BackupFailed, error));
                }
            }
        } else {
            report.warn("Backup skipped (--no-backup)");
        }
    }

    let plan_options = PlanOptions {
        schema: target
            .as_ref()
            .map(|t| t.schema.clone())
            .unwrap_or_else(|| "public".to_string()),
        include_sequences: options.include_sequences,
        include_indexes: options.include_indexes,
        include_constraints: options.include_constraints,
    };
    let plan = plan_sync(&comparison, source.as_ref(), &plan_options);
    for warning in &plan.warnings {
        report.warn(warning.clone());
    }
    tracing::info!(
        operations = plan.operation_count(),
        phases = plan.phases.len(),
        "plan ready"
    );
    report.advance(RunState::Planned);

    match target.filter(|_| !options.dry_run) {
        None => {
            dry_run_plan(&plan, &mut report);
            report.advance(RunState::DryRun);
        }
        Some(target) => {
            let connection =
                match PgConnection::connect_with(target.connect_options(), &target.display_target())
                    .await
                {
                    Ok(connection) => connection,
                    Err(e) => {
                        return Err(fail(
                            report,
                            RunState::ApplyFailed,
                            Error::connection(e.to_string()),
                        ))
                    }
                };

            let before = snapshot(&connection, &plan.schema).await;
            let mut rollback = RollbackScript::new();

            if let Err(e) = execute_plan(&connection, &plan, &mut report, &mut rollback).await {
                verify_unchanged(&connection, &plan.schema, before.as_ref(), &mut report).await;
                if !rollback.is_empty() {
                    if let Err(write_error) = write_rollback(&rollback, &target, &options, &mut report) {
                        report.error(write_error.to_string());
                    }
                }
                let error = Error::Apply {
                    operation: e.operation,
                    message: e.message,
                    sql: e.sql,
                };
                return Err(fail(report, RunState::ApplyFailed, error));
            }
            report.advance(RunState::Applied);

            if !rollback.is_empty() {
                if let Err(e) = write_rollback(&rollback, &target, &options, &mut report) {
                    report.error(e.to_string());
                    return Err(finish(report, e));
                }
                report.advance(RunState::RollbackScriptWritten);
            }
        }
    }

    report.advance(RunState::Reported);
    report.finish();
    persist_report(&report);
    tracing::info!("{}", report.summary_line());
    Ok(report)
}

/// Blocking variant of [`sync`].
pub fn sync_blocking(options: SyncOptions) -> Result<RunReport, RunFailure> {
    let environment = options.environment.clone();
    let dry_run = options.dry_run;
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(sync(options)),
        Err(e) => {
            let report = RunReport::new(&environment, dry_run);
            Err(finish(report, Error::runtime(e.to_string())))
        }
    }
}

fn load_inputs(
    options: &SyncOptions,
    report: &mut RunReport,
) -> Result<(SchemaComparison, Option<SourceSchema>), Error> {
    let comparison = load_comparison(&options.diff_path).map_err(|e| Error::load(e.to_string()))?;

    let source = match &options.source_schema_path {
        Some(path) => Some(load_source_schema(path).map_err(|e| Error::load(e.to_string()))?),
        None => match companion_path(&options.diff_path, &comparison) {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "using source schema companion");
                Some(load_source_schema(&path).map_err(|e| Error::load(e.to_string()))?)
            }
            Some(path) => {
                if !comparison.differences.tables.missing_in_target.is_empty() {
                    report.warn(format!(
                        "Source schema companion {} not found; new tables rely on inline column lists",
                        path.display()
                    ));
                }
                None
            }
            None => None,
        },
    };

    Ok((comparison, source))
}

async fn snapshot(connection: &PgConnection, schema: &str) -> Option<CatalogSnapshot> {
    match snapshot_catalog(connection, schema).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("catalog snapshot unavailable: {e}");
            None
        }
    }
}

/// After a failed apply the target catalog must match the pre-run snapshot.
async fn verify_unchanged(
    connection: &PgConnection,
    schema: &str,
    before: Option<&CatalogSnapshot>,
    report: &mut RunReport,
) {
    let Some(before) = before else {
        return;
    };
    let Some(after) = snapshot(connection, schema).await else {
        return;
    };
    if before.fingerprint() == after.fingerprint() {
        tracing::info!("target catalog unchanged after rollback");
    } else {
        report.error(format!(
            "Target schema '{schema}' differs from its pre-run state after rollback"
        ));
    }
}

fn write_rollback(
    rollback: &RollbackScript,
    target: &EnvironmentConfig,
    options: &SyncOptions,
    report: &mut RunReport,
) -> Result<(), Error> {
    let header = RollbackHeader {
        database: target.database.clone(),
        environment: options.environment.clone(),
        generated_at: report.started_at,
    };
    let path = rollback
        .write_to(&options.config.output.rollback_directory, &header)
        .map_err(|e| Error::io(format!("Failed to write rollback script: {e}")))?;
    tracing::info!(path = %path.display(), entries = rollback.entries().len(), "rollback script written");
    report.rollback_path = Some(path);
    Ok(())
}

fn fail(mut report: RunReport, state: RunState, error: Error) -> RunFailure {
    let message = redact_url(&error.to_string());
    report.error(message);
    if let Error::Backup {
        stderr: Some(stderr),
        ..
    } = &error
    {
        if !stderr.is_empty() {
            tracing::error!(stderr = %redact_url(stderr), "backup command output");
        }
    }
    report.advance(state);
    finish(report, error)
}

fn finish(mut report: RunReport, error: Error) -> RunFailure {
    report.finish();
    persist_report(&report);
    RunFailure {
        error,
        report: Box::new(report),
    }
}

fn persist_report(report: &RunReport) {
    if let Some(ref path) = report.log_path {
        if let Err(e) = append_to_log(path, &generate_text_report(report)) {
            tracing::warn!(path = %path.display(), "failed to append report to run log: {e}");
        }
    }
}
