use super::{Phase, PhaseKind, SyncOp, SyncPlan};
use crate::model::{
    ColumnSpec, ConstraintKind, IndexMethod, SchemaComparison, SourceSchema, TableSpec,
};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub schema: String,
    pub include_sequences: bool,
    pub include_indexes: bool,
    pub include_constraints: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            include_sequences: true,
            include_indexes: true,
            include_constraints: true,
        }
    }
}

/// Plan the additive changes of a validated comparison.
///
/// Phases always run sequences, tables, columns, indexes, constraints, and
/// constraints run PRIMARY KEY, UNIQUE, FOREIGN KEY, CHECK. Only
/// `missing_in_target` entries are read.
pub fn plan_sync(
    comparison: &SchemaComparison,
    source: Option<&SourceSchema>,
    options: &PlanOptions,
) -> SyncPlan {
    let diffs = &comparison.differences;
    let mut warnings = Vec::new();

    let mut create_sequences = Vec::new();
    if options.include_sequences {
        for seq in &diffs.sequences.missing_in_target {
            create_sequences.push(SyncOp::CreateSequence(seq.clone()));
        }
    }

    // Every table the target lacks, created or not. Columns of these are never ADDed.
    let new_tables: HashSet<&str> = diffs
        .tables
        .missing_in_target
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    let mut unavailable: HashSet<String> = HashSet::new();

    let mut resolved_tables: Vec<TableSpec> = Vec::new();
    for table in &diffs.tables.missing_in_target {
        match resolve_table(table, source) {
            Some(resolved) => resolved_tables.push(resolved),
            None => {
                let reason = if source.is_none() {
                    "no source schema document is available"
                } else {
                    "the source schema document has no columns for it"
                };
                warnings.push(format!(
                    "Skipping creation of table {}: {reason}",
                    table.name
                ));
                unavailable.insert(table.name.clone());
            }
        }
    }

    let mut add_columns = Vec::new();
    for column in &diffs.columns.missing_in_target {
        if unavailable.contains(&column.table) {
            warnings.push(format!(
                "Skipping column {}.{}: table {} is not being created",
                column.table, column.column, column.table
            ));
            continue;
        }
        if new_tables.contains(column.table.as_str()) {
            merge_into_new_table(column, &mut resolved_tables, &mut warnings);
            continue;
        }
        add_columns.push(SyncOp::AddColumn(downgrade_not_null(
            column,
            &mut warnings,
        )));
    }

    let create_tables: Vec<SyncOp> = resolved_tables.into_iter().map(SyncOp::CreateTable).collect();

    let planned_key_constraints: HashSet<(&str, &str)> = if options.include_constraints {
        diffs
            .constraints
            .missing_in_target
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique))
            .filter(|c| !unavailable.contains(&c.table))
            .map(|c| (c.table.as_str(), c.constraint.as_str()))
            .collect()
    } else {
        HashSet::new()
    };

    let mut create_indexes = Vec::new();
    if options.include_indexes {
        for index in &diffs.indexes.missing_in_target {
            if index.is_primary {
                tracing::debug!(index = %index.index, "primary key index comes from its constraint");
                continue;
            }
            if unavailable.contains(&index.table) {
                warnings.push(format!(
                    "Skipping index {}: table {} is not being created",
                    index.index, index.table
                ));
                continue;
            }
            if index.method == IndexMethod::Other {
                warnings.push(format!(
                    "Skipping index {}: its access method is not supported",
                    index.index
                ));
                continue;
            }
            if planned_key_constraints.contains(&(index.table.as_str(), index.index.as_str())) {
                tracing::debug!(index = %index.index, "index comes from its constraint");
                continue;
            }
            create_indexes.push(SyncOp::CreateIndex(index.clone()));
        }
    }

    let mut add_constraints = Vec::new();
    if options.include_constraints {
        let mut constraints: Vec<_> = diffs.constraints.missing_in_target.iter().collect();
        // Stable: input order is kept within each constraint kind.
        constraints.sort_by_key(|c| c.kind);

        for constraint in constraints {
            if constraint.kind == ConstraintKind::Other {
                warnings.push(format!(
                    "Skipping constraint {}: its type is not supported",
                    constraint.constraint
                ));
                continue;
            }
            if unavailable.contains(&constraint.table) {
                warnings.push(format!(
                    "Skipping constraint {}: table {} is not being created",
                    constraint.constraint, constraint.table
                ));
                continue;
            }
            if let Some(ref foreign_table) = constraint.foreign_table {
                if constraint.kind == ConstraintKind::ForeignKey
                    && unavailable.contains(foreign_table)
                {
                    warnings.push(format!(
                        "Skipping constraint {}: referenced table {foreign_table} is not being created",
                        constraint.constraint
                    ));
                    continue;
                }
            }
            add_constraints.push(SyncOp::AddConstraint(constraint.clone()));
        }
    }

    let phases = PhaseKind::ALL
        .into_iter()
        .zip([
            create_sequences,
            create_tables,
            add_columns,
            create_indexes,
            add_constraints,
        ])
        .filter(|(_, ops)| !ops.is_empty())
        .map(|(kind, ops)| Phase { kind, ops })
        .collect();

    SyncPlan {
        schema: options.schema.clone(),
        phases,
        warnings,
    }
}

/// Full table definition, from the diff entry or the companion document.
fn resolve_table(table: &TableSpec, source: Option<&SourceSchema>) -> Option<TableSpec> {
    let companion = source.and_then(|s| s.table(&table.name));

    let columns = if !table.columns.is_empty() {
        table.columns.clone()
    } else {
        companion.map(|t| t.columns.clone()).unwrap_or_default()
    };
    if columns.is_empty() {
        return None;
    }

    let columns = columns
        .into_iter()
        .map(|mut column| {
            if column.table.is_empty() {
                column.table = table.name.clone();
            }
            column
        })
        .collect();

    Some(TableSpec {
        name: table.name.clone(),
        columns,
        comment: table
            .comment
            .clone()
            .or_else(|| companion.and_then(|t| t.comment.clone())),
    })
}

/// A column listed for a table that is being created belongs in its CREATE TABLE.
/// Adding it there keeps the column even when the table definition omitted it.
fn merge_into_new_table(
    column: &ColumnSpec,
    tables: &mut [TableSpec],
    warnings: &mut Vec<String>,
) {
    let Some(table) = tables.iter_mut().find(|t| t.name == column.table) else {
        return;
    };
    if table.columns.iter().any(|c| c.column == column.column) {
        tracing::debug!(
            table = %column.table,
            column = %column.column,
            "column is part of CREATE TABLE"
        );
        return;
    }
    warnings.push(format!(
        "Column {}.{} is missing from the definition of new table {}; adding it to CREATE TABLE",
        column.table, column.column, column.table
    ));
    table.columns.push(column.clone());
}

/// Existing rows would violate NOT NULL without a default, so such columns are added nullable.
fn downgrade_not_null(column: &ColumnSpec, warnings: &mut Vec<String>) -> ColumnSpec {
    let mut column = column.clone();
    if !column.is_nullable && column.column_default.is_none() {
        warnings.push(format!(
            "Column {}.{} is NOT NULL without a default; adding it as nullable",
            column.table, column.column
        ));
        column.is_nullable = true;
    }
    column
}
