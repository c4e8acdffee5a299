pub mod planner;

use crate::model::{ColumnSpec, ConstraintSpec, IndexSpec, SequenceSpec, TableSpec};
use serde::Serialize;
use std::fmt;

/// One atomic additive change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "spec", rename_all = "snake_case")]
pub enum SyncOp {
    CreateSequence(SequenceSpec),
    CreateTable(TableSpec),
    AddColumn(ColumnSpec),
    CreateIndex(IndexSpec),
    AddConstraint(ConstraintSpec),
}

impl SyncOp {
    pub fn phase(&self) -> PhaseKind {
        match self {
            SyncOp::CreateSequence(_) => PhaseKind::Sequences,
            SyncOp::CreateTable(_) => PhaseKind::Tables,
            SyncOp::AddColumn(_) => PhaseKind::Columns,
            SyncOp::CreateIndex(_) => PhaseKind::Indexes,
            SyncOp::AddConstraint(_) => PhaseKind::Constraints,
        }
    }

    /// Constraint failures are logged and skipped; everything else aborts the run.
    pub fn is_soft_fail(&self) -> bool {
        matches!(self, SyncOp::AddConstraint(_))
    }

    pub fn describe(&self) -> String {
        match self {
            SyncOp::CreateSequence(seq) => format!("create sequence {}", seq.name),
            SyncOp::CreateTable(table) => format!(
                "create table {} ({} columns)",
                table.name,
                table.columns.len()
            ),
            SyncOp::AddColumn(column) => format!(
                "add column {}.{} {}",
                column.table, column.column, column.data_type
            ),
            SyncOp::CreateIndex(index) => format!(
                "create {}index {} on {}",
                if index.is_unique { "unique " } else { "" },
                index.index,
                index.table
            ),
            SyncOp::AddConstraint(constraint) => format!(
                "add {} constraint {} on {}",
                constraint.kind.as_sql(),
                constraint.constraint,
                constraint.table
            ),
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Fixed execution order of the additive phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Sequences,
    Tables,
    Columns,
    Indexes,
    Constraints,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 5] = [
        PhaseKind::Sequences,
        PhaseKind::Tables,
        PhaseKind::Columns,
        PhaseKind::Indexes,
        PhaseKind::Constraints,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PhaseKind::Sequences => "sequences",
            PhaseKind::Tables => "tables",
            PhaseKind::Columns => "columns",
            PhaseKind::Indexes => "indexes",
            PhaseKind::Constraints => "constraints",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub ops: Vec<SyncOp>,
}

/// Ordered phases plus the warnings raised while planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// PostgreSQL schema every identifier is qualified with.
    pub schema: String,
    pub phases: Vec<Phase>,
    pub warnings: Vec<String>,
}

impl SyncPlan {
    pub fn operations(&self) -> impl Iterator<Item = &SyncOp> {
        self.phases.iter().flat_map(|phase| phase.ops.iter())
    }

    pub fn operation_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.ops.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}
