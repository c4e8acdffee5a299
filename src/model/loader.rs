use super::{ConstraintKind, IndexMethod, SchemaComparison, SourceSchema};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid entry at {location}: {message}")]
    Shape { location: String, message: String },
}

pub fn load_comparison(path: &Path) -> Result<SchemaComparison, LoadError> {
    let content = read(path)?;
    let comparison: SchemaComparison =
        serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: path.display().to_string(),
            source,
        })?;
    check_comparison(&comparison)?;
    Ok(comparison)
}

pub fn parse_comparison(json: &str) -> Result<SchemaComparison, LoadError> {
    let comparison: SchemaComparison =
        serde_json::from_str(json).map_err(|source| LoadError::Json {
            path: "<inline>".to_string(),
            source,
        })?;
    check_comparison(&comparison)?;
    Ok(comparison)
}

pub fn load_source_schema(path: &Path) -> Result<SourceSchema, LoadError> {
    let content = read(path)?;
    let mut schema: SourceSchema =
        serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: path.display().to_string(),
            source,
        })?;

    for table in &mut schema.tables {
        for column in &mut table.columns {
            if column.table.is_empty() {
                column.table = table.name.clone();
            }
        }
    }

    Ok(schema)
}

/// `<diff dir>/<source database>.schema.json`, when the source database is named.
pub fn companion_path(diff_path: &Path, comparison: &SchemaComparison) -> Option<PathBuf> {
    let database = comparison.metadata.source.database.as_deref()?;
    let dir = diff_path.parent().unwrap_or_else(|| Path::new("."));
    Some(dir.join(format!("{database}.schema.json")))
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Rejects entries that deserialize but cannot be turned into DDL.
fn check_comparison(comparison: &SchemaComparison) -> Result<(), LoadError> {
    let diffs = &comparison.differences;

    for (i, seq) in diffs.sequences.missing_in_target.iter().enumerate() {
        require(&seq.name, "sequences", i, "name")?;
    }

    for (i, table) in diffs.tables.missing_in_target.iter().enumerate() {
        require(&table.name, "tables", i, "name")?;
    }

    for (i, column) in diffs.columns.missing_in_target.iter().enumerate() {
        require(&column.table, "columns", i, "table")?;
        require(&column.column, "columns", i, "column")?;
        require(&column.data_type, "columns", i, "data_type")?;
    }

    for (i, index) in diffs.indexes.missing_in_target.iter().enumerate() {
        require(&index.table, "indexes", i, "table")?;
        require(&index.index, "indexes", i, "index")?;
        if index.columns.is_empty() && !index.is_primary {
            return Err(shape("indexes", i, "index has no columns"));
        }
        if index.method == IndexMethod::Other {
            return Err(shape("indexes", i, "unsupported index method"));
        }
    }

    for (i, constraint) in diffs.constraints.missing_in_target.iter().enumerate() {
        require(&constraint.table, "constraints", i, "table")?;
        require(&constraint.constraint, "constraints", i, "constraint")?;
        match constraint.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                if constraint.columns.is_empty() {
                    return Err(shape("constraints", i, "key constraint has no columns"));
                }
            }
            ConstraintKind::ForeignKey => {
                if constraint.columns.is_empty()
                    || constraint.foreign_table.as_deref().unwrap_or("").is_empty()
                    || constraint.foreign_columns.is_empty()
                {
                    return Err(shape(
                        "constraints",
                        i,
                        "foreign key needs column, foreign_table and foreign_column",
                    ));
                }
                if constraint.columns.len() != constraint.foreign_columns.len() {
                    return Err(shape(
                        "constraints",
                        i,
                        "foreign key column count does not match referenced columns",
                    ));
                }
            }
            ConstraintKind::Check => {
                if constraint.check_clause.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(shape("constraints", i, "check constraint has no check_clause"));
                }
            }
            ConstraintKind::Other => {
                return Err(shape("constraints", i, "unsupported constraint type"));
            }
        }
    }

    Ok(())
}

fn require(value: &str, kind: &str, index: usize, field: &str) -> Result<(), LoadError> {
    if value.trim().is_empty() {
        return Err(shape(kind, index, &format!("missing {field}")));
    }
    Ok(())
}

fn shape(kind: &str, index: usize, message: &str) -> LoadError {
    LoadError::Shape {
        location: format!("differences.{kind}.missing_in_target[{index}]"),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DIFF: &str = r#"{
        "metadata": { "source": { "database": "shop_dev" }, "target": { "database": "shop_prod" } },
        "summary": { "critical_differences": 0, "total_differences": 3 },
        "differences": {
            "tables": { "missing_in_target": [ { "name": "t1" } ] },
            "columns": {
                "missing_in_target": [
                    { "table": "orders", "column": "notes", "data_type": "text", "is_nullable": "YES" }
                ],
                "missing_in_source": [
                    { "table": "orders", "column": "legacy_code", "data_type": "text" }
                ]
            },
            "indexes": {
                "missing_in_target": [
                    { "table": "t1", "index": "t1_name_idx", "columns": ["name"], "is_unique": true }
                ]
            }
        }
    }"#;

    #[test]
    fn parses_minimal_document() {
        let comparison = parse_comparison(DIFF).unwrap();
        assert_eq!(comparison.summary.critical_differences, 0);
        assert_eq!(comparison.differences.tables.missing_in_target.len(), 1);
        assert_eq!(comparison.differences.columns.missing_in_source.len(), 1);
        assert!(comparison.differences.sequences.is_empty());
        assert!(comparison.differences.constraints.is_empty());
        assert_eq!(
            comparison.metadata.source.database.as_deref(),
            Some("shop_dev")
        );
    }

    #[test]
    fn missing_summary_fails_fast() {
        let err = parse_comparison(r#"{ "differences": {} }"#).unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }

    #[test]
    fn foreign_key_without_target_is_rejected() {
        let json = r#"{
            "summary": { "critical_differences": 0 },
            "differences": {
                "constraints": {
                    "missing_in_target": [
                        { "table": "orders", "constraint": "orders_fk", "type": "FOREIGN KEY", "column": "customer_id" }
                    ]
                }
            }
        }"#;
        let err = parse_comparison(json).unwrap_err();
        match err {
            LoadError::Shape { location, .. } => {
                assert_eq!(location, "differences.constraints.missing_in_target[0]");
            }
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn check_without_clause_is_rejected() {
        let json = r#"{
            "summary": { "critical_differences": 0 },
            "differences": {
                "constraints": {
                    "missing_in_target": [
                        { "table": "orders", "constraint": "orders_total_check", "type": "CHECK" }
                    ]
                }
            }
        }"#;
        assert!(matches!(
            parse_comparison(json),
            Err(LoadError::Shape { .. })
        ));
    }

    #[test]
    fn unsupported_entries_only_matter_when_missing_in_target() {
        let informational = r#"{
            "summary": { "critical_differences": 0 },
            "differences": {
                "indexes": {
                    "missing_in_source": [
                        { "table": "places", "index": "places_bloom_idx", "method": "bloom" }
                    ]
                },
                "constraints": {
                    "missing_in_source": [
                        { "table": "bookings", "constraint": "bookings_no_overlap", "type": "EXCLUDE" },
                        { "constraint_name": "legacy_trigger", "constraint_type": "TRIGGER" }
                    ]
                }
            }
        }"#;
        let comparison = parse_comparison(informational).unwrap();
        assert_eq!(comparison.differences.constraints.missing_in_source.len(), 2);
        assert_eq!(comparison.differences.indexes.missing_in_source.len(), 1);

        let creatable = r#"{
            "summary": { "critical_differences": 0 },
            "differences": {
                "constraints": {
                    "missing_in_target": [
                        { "table": "bookings", "constraint": "bookings_no_overlap", "type": "EXCLUDE" }
                    ]
                }
            }
        }"#;
        match parse_comparison(creatable).unwrap_err() {
            LoadError::Shape { location, message } => {
                assert_eq!(location, "differences.constraints.missing_in_target[0]");
                assert!(message.contains("unsupported"));
            }
            other => panic!("expected shape error, got {other:?}"),
        }

        let index = r#"{
            "summary": { "critical_differences": 0 },
            "differences": {
                "indexes": {
                    "missing_in_target": [
                        { "table": "places", "index": "places_bloom_idx", "columns": ["name"], "method": "bloom" }
                    ]
                }
            }
        }"#;
        assert!(matches!(
            parse_comparison(index),
            Err(LoadError::Shape { .. })
        ));
    }

    #[test]
    fn load_comparison_reports_missing_file() {
        let err = load_comparison(Path::new("/nonexistent/diff.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/diff.json"));
    }

    #[test]
    fn source_schema_columns_inherit_table_name() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "database": "shop_dev", "tables": [
                {{ "name": "t1", "comment": "lookup", "columns": [
                    {{ "column": "id", "data_type": "integer", "is_nullable": "NO" }},
                    {{ "column": "name", "data_type": "text" }}
                ] }}
            ] }}"#
        )
        .unwrap();

        let schema = load_source_schema(file.path()).unwrap();
        let table = schema.table("t1").unwrap();
        assert_eq!(table.comment.as_deref(), Some("lookup"));
        assert!(table.columns.iter().all(|c| c.table == "t1"));
        assert_eq!(table.columns[0].column, "id");
        assert_eq!(table.columns[1].column, "name");
    }

    #[test]
    fn companion_path_uses_source_database() {
        let comparison = parse_comparison(DIFF).unwrap();
        let path = companion_path(Path::new("/tmp/diffs/diff.json"), &comparison).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/diffs/shop_dev.schema.json"));
    }
}
