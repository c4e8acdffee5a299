use crate::diff::SyncOp;
use crate::model::{
    ColumnSpec, ConstraintKind, ConstraintSpec, IndexMethod, IndexSpec, ReferentialAction,
    SequenceSpec, TableSpec,
};

/// Statements that perform one operation. Comments follow their object.
pub fn generate_op_sql(op: &SyncOp, schema: &str) -> Vec<String> {
    match op {
        SyncOp::CreateSequence(seq) => vec![generate_create_sequence(schema, seq)],
        SyncOp::CreateTable(table) => generate_create_table(schema, table),
        SyncOp::AddColumn(column) => generate_add_column(schema, column),
        SyncOp::CreateIndex(index) => vec![generate_create_index(schema, index)],
        SyncOp::AddConstraint(constraint) => vec![generate_add_constraint(schema, constraint)],
    }
}

/// The single statement that undoes one operation.
pub fn generate_inverse_sql(op: &SyncOp, schema: &str) -> String {
    match op {
        SyncOp::CreateSequence(seq) => format!(
            "DROP SEQUENCE IF EXISTS {};",
            quote_qualified(schema, &seq.name)
        ),
        SyncOp::CreateTable(table) => format!(
            "DROP TABLE IF EXISTS {} CASCADE;",
            quote_qualified(schema, &table.name)
        ),
        SyncOp::AddColumn(column) => format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
            quote_qualified(schema, &column.table),
            quote_ident(&column.column)
        ),
        SyncOp::CreateIndex(index) => format!(
            "DROP INDEX IF EXISTS {};",
            quote_qualified(schema, &index.index)
        ),
        SyncOp::AddConstraint(constraint) => format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            quote_qualified(schema, &constraint.table),
            quote_ident(&constraint.constraint)
        ),
    }
}

fn generate_create_sequence(schema: &str, seq: &SequenceSpec) -> String {
    let mut parts = vec![
        "CREATE SEQUENCE".to_string(),
        quote_qualified(schema, &seq.name),
    ];

    if let Some(ref data_type) = seq.data_type {
        parts.push(format!("AS {data_type}"));
    }

    if let Some(increment) = seq.increment {
        parts.push(format!("INCREMENT BY {increment}"));
    }

    if let Some(min_value) = seq.minimum_value {
        parts.push(format!("MINVALUE {min_value}"));
    }

    if let Some(max_value) = seq.maximum_value {
        parts.push(format!("MAXVALUE {max_value}"));
    }

    if let Some(start) = seq.start_value {
        parts.push(format!("START WITH {start}"));
    }

    parts.push(if seq.cycle_option { "CYCLE" } else { "NO CYCLE" }.to_string());

    format!("{};", parts.join(" "))
}

fn generate_create_table(schema: &str, table: &TableSpec) -> Vec<String> {
    let mut statements = Vec::new();

    let column_defs: Vec<String> = table.columns.iter().map(format_column).collect();
    let qualified_name = quote_qualified(schema, &table.name);
    statements.push(format!(
        "CREATE TABLE {} (\n    {}\n);",
        qualified_name,
        column_defs.join(",\n    ")
    ));

    if let Some(ref comment) = table.comment {
        statements.push(format!(
            "COMMENT ON TABLE {} IS '{}';",
            qualified_name,
            escape_string(comment)
        ));
    }

    for column in &table.columns {
        if let Some(statement) = generate_column_comment(schema, &table.name, column) {
            statements.push(statement);
        }
    }

    statements
}

fn generate_add_column(schema: &str, column: &ColumnSpec) -> Vec<String> {
    let mut statements = vec![format!(
        "ALTER TABLE {} ADD COLUMN {};",
        quote_qualified(schema, &column.table),
        format_column(column)
    )];

    if let Some(statement) = generate_column_comment(schema, &column.table, column) {
        statements.push(statement);
    }

    statements
}

fn generate_column_comment(schema: &str, table: &str, column: &ColumnSpec) -> Option<String> {
    column.column_comment.as_ref().map(|comment| {
        format!(
            "COMMENT ON COLUMN {}.{} IS '{}';",
            quote_qualified(schema, table),
            quote_ident(&column.column),
            escape_string(comment)
        )
    })
}

fn generate_create_index(schema: &str, index: &IndexSpec) -> String {
    let unique = if index.is_unique { "UNIQUE " } else { "" };
    let method = match index.method {
        IndexMethod::BTree => "",
        IndexMethod::Hash => " USING hash",
        IndexMethod::Gin => " USING gin",
        IndexMethod::Gist => " USING gist",
        IndexMethod::SpGist => " USING spgist",
        IndexMethod::Brin => " USING brin",
        // Never planned.
        IndexMethod::Other => "",
    };

    format!(
        "CREATE {}INDEX {} ON {}{} ({});",
        unique,
        quote_ident(&index.index),
        quote_qualified(schema, &index.table),
        method,
        format_column_list(&index.columns)
    )
}

fn generate_add_constraint(schema: &str, constraint: &ConstraintSpec) -> String {
    let prefix = format!(
        "ALTER TABLE {} ADD CONSTRAINT {}",
        quote_qualified(schema, &constraint.table),
        quote_ident(&constraint.constraint)
    );

    match constraint.kind {
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => format!(
            "{} {} ({});",
            prefix,
            constraint.kind.as_sql(),
            format_column_list(&constraint.columns)
        ),
        ConstraintKind::ForeignKey => format!(
            "{} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {};",
            prefix,
            format_column_list(&constraint.columns),
            quote_qualified(schema, constraint.foreign_table.as_deref().unwrap_or_default()),
            format_column_list(&constraint.foreign_columns),
            format_referential_action(constraint.delete_rule),
            format_referential_action(constraint.update_rule)
        ),
        ConstraintKind::Check => {
            let clause = constraint.check_clause.as_deref().unwrap_or_default().trim();
            if has_check_keyword(clause) {
                format!("{prefix} {clause};")
            } else {
                format!("{prefix} CHECK ({clause});")
            }
        }
        // Never planned; the clause would hold a full pg_get_constraintdef definition.
        ConstraintKind::Other => format!(
            "{} {};",
            prefix,
            constraint.check_clause.as_deref().unwrap_or_default().trim()
        ),
    }
}

/// True for pg_get_constraintdef output such as `CHECK ((amount > 0))`, not for
/// bare expressions that merely start with "check", like `check_positive(amount)`.
fn has_check_keyword(clause: &str) -> bool {
    match clause.get(..5) {
        Some(keyword) if keyword.eq_ignore_ascii_case("CHECK") => {
            clause[5..].trim_start().starts_with('(')
        }
        _ => false,
    }
}

fn format_column(column: &ColumnSpec) -> String {
    let mut parts = vec![quote_ident(&column.column), format_column_type(column)];

    if !column.is_nullable {
        parts.push("NOT NULL".to_string());
    }

    if let Some(ref default) = column.column_default {
        parts.push(format!("DEFAULT {default}"));
    }

    parts.join(" ")
}

/// Rebuilds a full type from `information_schema.columns` fields.
pub fn format_column_type(column: &ColumnSpec) -> String {
    let data_type = column.data_type.trim();

    match data_type.to_ascii_lowercase().as_str() {
        "user-defined" => match column.udt_name {
            Some(ref udt) => quote_ident(udt),
            None => data_type.to_string(),
        },
        "array" => match column.udt_name {
            Some(ref udt) => format!("{}[]", udt.trim_start_matches('_')),
            None => data_type.to_string(),
        },
        "character varying" | "varchar" | "character" | "char" | "bit" | "bit varying" => {
            match column.character_maximum_length {
                Some(len) => format!("{data_type}({len})"),
                None => data_type.to_string(),
            }
        }
        "numeric" | "decimal" => match (column.numeric_precision, column.numeric_scale) {
            (Some(precision), Some(scale)) => format!("{data_type}({precision},{scale})"),
            (Some(precision), None) => format!("{data_type}({precision})"),
            _ => data_type.to_string(),
        },
        _ => data_type.to_string(),
    }
}

fn format_referential_action(action: Option<ReferentialAction>) -> &'static str {
    match action.unwrap_or(ReferentialAction::NoAction) {
        ReferentialAction::NoAction => "NO ACTION",
        ReferentialAction::Restrict => "RESTRICT",
        ReferentialAction::Cascade => "CASCADE",
        ReferentialAction::SetNull => "SET NULL",
        ReferentialAction::SetDefault => "SET DEFAULT",
    }
}

fn format_column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub fn quote_qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

fn escape_string(value: &str) -> String {
    value.replace('\'', "''")
}
