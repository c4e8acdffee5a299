//! Executes a [`SyncPlan`] inside one transaction.
//!
//! Constraint operations run under a savepoint so that a failing constraint
//! can be undone without aborting the surrounding transaction.

use crate::diff::{SyncOp, SyncPlan};
use crate::pg::connection::PgConnection;
use crate::pg::sqlgen::generate_op_sql;
use crate::report::{OperationOutcome, OperationStatus, RunReport, SyncCounters};
use crate::rollback::RollbackScript;
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use thiserror::Error;

const CONSTRAINT_SAVEPOINT: &str = "pgsafesync_constraint";

/// Anything that can execute a DDL statement against the target.
#[async_trait]
pub trait DdlSession: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl<'c> DdlSession for Transaction<'c, Postgres> {
    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        sqlx::Executor::execute(&mut **self, sql).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Failed to {operation}: {message}")]
pub struct ApplyError {
    pub operation: String,
    pub message: String,
    pub sql: Option<String>,
}

impl ApplyError {
    fn transaction(operation: &str, error: sqlx::Error) -> Self {
        Self {
            operation: operation.to_string(),
            message: error.to_string(),
            sql: None,
        }
    }
}

/// Effects of a plan executed in a still-open transaction.
#[derive(Debug, Default)]
pub struct AppliedBatch {
    pub counters: SyncCounters,
    pub outcomes: Vec<OperationOutcome>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct ApplyFailure {
    pub error: ApplyError,
    /// Outcomes up to and including the failed operation, earlier ones marked rolled back.
    pub outcomes: Vec<OperationOutcome>,
    pub warnings: Vec<String>,
}

/// Describes the plan without touching any database.
pub fn dry_run_plan(plan: &SyncPlan, report: &mut RunReport) {
    for phase in &plan.phases {
        tracing::info!(phase = phase.kind.label(), operations = phase.ops.len(), "dry run phase");
        for op in &phase.ops {
            let statements = generate_op_sql(op, &plan.schema);
            tracing::info!("would {op}");
            for statement in &statements {
                tracing::debug!(sql = %statement, "planned statement");
            }
            report.counters.record(op);
            report.operations.push(OperationOutcome {
                phase: op.phase(),
                description: op.describe(),
                statements,
                status: OperationStatus::Planned,
                error: None,
            });
        }
    }
}

/// Executes every operation of `plan` on `session` without committing.
///
/// Successful operations stage their inverse in `rollback`. The caller owns
/// the transaction and decides whether the staged entries survive.
pub async fn apply_plan<S>(
    session: &mut S,
    plan: &SyncPlan,
    rollback: &mut RollbackScript,
) -> Result<AppliedBatch, ApplyFailure>
where
    S: DdlSession + ?Sized,
{
    let mut batch = AppliedBatch::default();

    for phase in &plan.phases {
        tracing::info!(phase = phase.kind.label(), operations = phase.ops.len(), "applying phase");
        for op in &phase.ops {
            let statements = generate_op_sql(op, &plan.schema);
            let result = if op.is_soft_fail() {
                apply_with_savepoint(session, &statements).await
            } else {
                run_statements(session, &statements).await.map(|_| StepResult::Applied)
            };

            match result {
                Ok(StepResult::Applied) => {
                    tracing::info!("{op}");
                    batch.counters.record(op);
                    rollback.record(op, &plan.schema);
                    batch.outcomes.push(outcome(op, statements, OperationStatus::Applied, None));
                }
                Ok(StepResult::Skipped(message)) => {
                    let warning = format!("Skipped {op}: {message}");
                    tracing::warn!("{warning}");
                    batch.counters.constraints_failed += 1;
                    batch.warnings.push(warning);
                    batch.outcomes.push(outcome(
                        op,
                        statements,
                        OperationStatus::SoftFailed,
                        Some(message),
                    ));
                }
                Err((sql, message)) => {
                    tracing::error!(sql = %sql, "{op} failed: {message}");
                    let mut outcomes = batch.outcomes;
                    for earlier in &mut outcomes {
                        if earlier.status == OperationStatus::Applied {
                            earlier.status = OperationStatus::RolledBack;
                        }
                    }
                    outcomes.push(outcome(
                        op,
                        statements,
                        OperationStatus::Failed,
                        Some(message.clone()),
                    ));
                    return Err(ApplyFailure {
                        error: ApplyError {
                            operation: op.describe(),
                            message,
                            sql: Some(sql),
                        },
                        outcomes,
                        warnings: batch.warnings,
                    });
                }
            }
        }
    }

    Ok(batch)
}

/// Runs `plan` in a fresh transaction and commits it.
///
/// On success the batch is merged into `report` and the staged rollback
/// entries are committed. On any failure the transaction is rolled back,
/// the staged entries are discarded and no counters are applied.
pub async fn execute_plan(
    connection: &PgConnection,
    plan: &SyncPlan,
    report: &mut RunReport,
    rollback: &mut RollbackScript,
) -> Result<(), ApplyError> {
    let mut transaction = connection
        .pool()
        .begin()
        .await
        .map_err(|e| ApplyError::transaction("begin transaction", e))?;

    match apply_plan(&mut transaction, plan, rollback).await {
        Ok(batch) => {
            if let Err(e) = transaction.commit().await {
                let dropped = rollback.discard_pending();
                tracing::error!(dropped, "commit failed, transaction rolled back");
                absorb_rolled_back(report, batch.outcomes, batch.warnings);
                return Err(ApplyError::transaction("commit transaction", e));
            }
            rollback.commit_pending();
            report.counters.merge_changes(&batch.counters);
            absorb_outcomes(report, batch.outcomes, batch.warnings);
            tracing::info!(changes = report.counters.total_changes(), "transaction committed");
            Ok(())
        }
        Err(failure) => {
            if let Err(e) = transaction.rollback().await {
                tracing::error!("explicit rollback failed: {e}");
            }
            let dropped = rollback.discard_pending();
            tracing::error!(dropped, "transaction rolled back");
            absorb_rolled_back(report, failure.outcomes, failure.warnings);
            Err(failure.error)
        }
    }
}

/// Records the work of a transaction that did not commit: nothing counts as
/// applied, soft-failed constraints still count as failed.
fn absorb_rolled_back(
    report: &mut RunReport,
    mut outcomes: Vec<OperationOutcome>,
    warnings: Vec<String>,
) {
    for outcome in &mut outcomes {
        match outcome.status {
            OperationStatus::Applied => outcome.status = OperationStatus::RolledBack,
            OperationStatus::SoftFailed => report.counters.constraints_failed += 1,
            _ => {}
        }
    }
    absorb_outcomes(report, outcomes, warnings);
}

fn absorb_outcomes(report: &mut RunReport, outcomes: Vec<OperationOutcome>, warnings: Vec<String>) {
    report.operations.extend(outcomes);
    for warning in warnings {
        report.warnings.push(warning);
        report.counters.warnings += 1;
    }
}

enum StepResult {
    Applied,
    Skipped(String),
}

async fn run_statements<S>(session: &mut S, statements: &[String]) -> Result<(), (String, String)>
where
    S: DdlSession + ?Sized,
{
    for statement in statements {
        session
            .execute(statement)
            .await
            .map_err(|e| (statement.clone(), e.to_string()))?;
    }
    Ok(())
}

async fn apply_with_savepoint<S>(
    session: &mut S,
    statements: &[String],
) -> Result<StepResult, (String, String)>
where
    S: DdlSession + ?Sized,
{
    let savepoint = format!("SAVEPOINT {CONSTRAINT_SAVEPOINT}");
    let release = format!("RELEASE SAVEPOINT {CONSTRAINT_SAVEPOINT}");
    let restore = format!("ROLLBACK TO SAVEPOINT {CONSTRAINT_SAVEPOINT}");

    run_statements(session, std::slice::from_ref(&savepoint)).await?;

    match run_statements(session, statements).await {
        Ok(()) => {
            run_statements(session, std::slice::from_ref(&release)).await?;
            Ok(StepResult::Applied)
        }
        Err((_, message)) => {
            run_statements(session, &[restore, release]).await?;
            Ok(StepResult::Skipped(message))
        }
    }
}

fn outcome(
    op: &SyncOp,
    statements: Vec<String>,
    status: OperationStatus,
    error: Option<String>,
) -> OperationOutcome {
    OperationOutcome {
        phase: op.phase(),
        description: op.describe(),
        statements,
        status,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::planner::{plan_sync, PlanOptions};
    use crate::model::loader::parse_comparison;

    /// Records statements and fails any containing one of the markers.
    #[derive(Default)]
    struct MockSession {
        executed: Vec<String>,
        fail_on: Vec<&'static str>,
    }

    #[async_trait]
    impl DdlSession for MockSession {
        async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
            self.executed.push(sql.to_string());
            if self.fail_on.iter().any(|marker| sql.contains(marker)) {
                return Err(sqlx::Error::Protocol(format!("rejected: {sql}")));
            }
            Ok(())
        }
    }

    fn plan() -> SyncPlan {
        let comparison = parse_comparison(
            r#"{
                "summary": {"critical_differences": 0},
                "differences": {
                    "tables": {"missing_in_target": [
                        {"name": "t1", "columns": [
                            {"column": "id", "data_type": "integer", "is_nullable": "NO"},
                            {"column": "name", "data_type": "text"}
                        ]}
                    ]},
                    "columns": {"missing_in_target": [
                        {"table": "t2", "column": "c", "data_type": "integer"}
                    ]},
                    "indexes": {"missing_in_target": [
                        {"table": "t1", "index": "t1_name_idx", "columns": ["name"]}
                    ]},
                    "constraints": {"missing_in_target": [
                        {"table": "t1", "constraint": "t1_pkey", "type": "PRIMARY KEY", "columns": ["id"]},
                        {"table": "t2", "constraint": "t2_c_check", "type": "CHECK", "check_clause": "c > 0"}
                    ]}
                }
            }"#,
        )
        .unwrap();
        plan_sync(&comparison, None, &PlanOptions::default())
    }

    #[tokio::test]
    async fn applies_every_operation_in_phase_order() {
        let plan = plan();
        let mut session = MockSession::default();
        let mut rollback = RollbackScript::new();

        let batch = apply_plan(&mut session, &plan, &mut rollback).await.unwrap();

        assert_eq!(batch.counters.tables_created, 1);
        assert_eq!(batch.counters.columns_added, 1);
        assert_eq!(batch.counters.indexes_created, 1);
        assert_eq!(batch.counters.constraints_added, 2);
        assert_eq!(batch.counters.constraints_failed, 0);
        assert_eq!(rollback.pending_len(), 5);
        assert!(rollback.is_empty());

        assert!(session.executed[0].starts_with("CREATE TABLE"));
        let savepoints = session
            .executed
            .iter()
            .filter(|sql| sql.starts_with("SAVEPOINT"))
            .count();
        assert_eq!(savepoints, 2);
    }

    #[tokio::test]
    async fn constraint_failure_is_skipped_and_run_continues() {
        let plan = plan();
        let mut session = MockSession {
            fail_on: vec!["t1_pkey"],
            ..Default::default()
        };
        let mut rollback = RollbackScript::new();

        let batch = apply_plan(&mut session, &plan, &mut rollback).await.unwrap();

        assert_eq!(batch.counters.constraints_added, 1);
        assert_eq!(batch.counters.constraints_failed, 1);
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("t1_pkey"));
        assert_eq!(rollback.pending_len(), 4);
        assert!(session
            .executed
            .iter()
            .any(|sql| sql == "ROLLBACK TO SAVEPOINT pgsafesync_constraint"));

        let failed: Vec<_> = batch
            .outcomes
            .iter()
            .filter(|o| o.status == OperationStatus::SoftFailed)
            .collect();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn column_failure_aborts_and_marks_earlier_work_rolled_back() {
        let plan = plan();
        let mut session = MockSession {
            fail_on: vec!["ADD COLUMN"],
            ..Default::default()
        };
        let mut rollback = RollbackScript::new();

        let failure = apply_plan(&mut session, &plan, &mut rollback)
            .await
            .unwrap_err();

        assert!(failure.error.operation.contains("add column t2.c"));
        assert!(failure.error.sql.as_deref().unwrap().contains("ADD COLUMN"));
        assert_eq!(failure.outcomes.len(), 2);
        assert_eq!(failure.outcomes[0].status, OperationStatus::RolledBack);
        assert_eq!(failure.outcomes[1].status, OperationStatus::Failed);
        assert!(!session.executed.iter().any(|sql| sql.contains("CREATE INDEX")));
    }

    #[tokio::test]
    async fn uncommitted_batch_keeps_soft_failures_and_applies_nothing() {
        let plan = plan();
        let mut session = MockSession {
            fail_on: vec!["t1_pkey"],
            ..Default::default()
        };
        let mut rollback = RollbackScript::new();
        let batch = apply_plan(&mut session, &plan, &mut rollback).await.unwrap();

        // As after a failed COMMIT.
        let mut report = RunReport::new("development", false);
        absorb_rolled_back(&mut report, batch.outcomes, batch.warnings);

        assert_eq!(report.counters.total_changes(), 0);
        assert_eq!(report.counters.constraints_failed, 1);
        assert_eq!(report.counters.warnings, 1);
        assert_eq!(report.operations.len(), 5);
        assert!(report.operations.iter().all(|o| matches!(
            o.status,
            OperationStatus::RolledBack | OperationStatus::SoftFailed
        )));
    }

    #[test]
    fn dry_run_counts_without_rollback_entries() {
        let plan = plan();
        let mut report = RunReport::new("development", true);
        dry_run_plan(&plan, &mut report);

        assert_eq!(report.counters.tables_created, 1);
        assert_eq!(report.counters.columns_added, 1);
        assert_eq!(report.counters.indexes_created, 1);
        assert_eq!(report.counters.constraints_added, 2);
        assert!(report
            .operations
            .iter()
            .all(|o| o.status == OperationStatus::Planned));
    }
}
