//! Safety checks run on a comparison before anything is planned.

use crate::model::{EntityDiff, ModifiedEntity, SchemaComparison};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyIssue {
    pub rule: String,
    pub severity: IssueSeverity,
    pub message: String,
}

impl std::fmt::Display for SafetyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Verdict of [`validate_comparison`]. `ok` is false when any error was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<SafetyIssue>,
    pub warnings: Vec<SafetyIssue>,
}

impl ValidationReport {
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

pub fn validate_comparison(comparison: &SchemaComparison) -> ValidationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let critical = comparison.summary.critical_differences;
    if critical > 0 {
        issues.push(error(
            "critical_differences",
            format!("Comparison reports {critical} critical difference(s)"),
        ));
    }

    for modified in &comparison.differences.columns.modified {
        check_modified_column(modified, &mut issues, &mut warnings);
    }

    let diffs = &comparison.differences;
    check_destructive(&diffs.tables, "table", &mut issues, &mut warnings);
    check_destructive(&diffs.indexes, "index", &mut issues, &mut warnings);
    check_destructive(&diffs.constraints, "constraint", &mut issues, &mut warnings);
    check_destructive(&diffs.sequences, "sequence", &mut issues, &mut warnings);

    for (kind, count) in [
        ("sequence", diffs.sequences.missing_in_source.len()),
        ("table", diffs.tables.missing_in_source.len()),
        ("column", diffs.columns.missing_in_source.len()),
        ("index", diffs.indexes.missing_in_source.len()),
        ("constraint", diffs.constraints.missing_in_source.len()),
    ] {
        if count > 0 {
            warnings.push(warning(
                "missing_in_source",
                format!("{count} {kind}(s) exist only in target and will be ignored for safety"),
            ));
        }
    }

    ValidationReport {
        ok: issues.is_empty(),
        issues,
        warnings,
    }
}

fn check_modified_column<T>(
    modified: &ModifiedEntity<T>,
    issues: &mut Vec<SafetyIssue>,
    warnings: &mut Vec<SafetyIssue>,
) {
    let name = modified.display_name();
    let mut flagged = false;

    for difference in &modified.differences {
        if difference.is_data_type_change() && difference.is_incompatible() {
            flagged = true;
            issues.push(error(
                "incompatible_type_change",
                format!(
                    "Column {name} changes type from {} to {} which cannot be converted safely",
                    difference.target_value, difference.source_value
                ),
            ));
        }

        if difference.adds_not_null() && difference.is_high_risk() {
            flagged = true;
            issues.push(error(
                "unsafe_not_null",
                format!(
                    "Column {name} becomes NOT NULL without a safe default for existing rows"
                ),
            ));
        }
    }

    if !flagged && !modified.differences.is_empty() {
        warnings.push(warning(
            "modified_not_applied",
            format!("Column {name} differs from source; existing columns are never altered"),
        ));
    }
}

fn check_destructive<T>(
    diff: &EntityDiff<T>,
    kind: &str,
    issues: &mut Vec<SafetyIssue>,
    warnings: &mut Vec<SafetyIssue>,
) {
    for modified in &diff.modified {
        let name = modified.display_name();
        let risky: Vec<&str> = modified
            .differences
            .iter()
            .filter(|d| d.is_high_risk())
            .map(|d| d.kind.as_str())
            .collect();

        if !risky.is_empty() {
            issues.push(error(
                "destructive_modification",
                format!(
                    "Modified {kind} {name} ({}) can only be reconciled by dropping it",
                    risky.join(", ")
                ),
            ));
        } else if !modified.differences.is_empty() {
            warnings.push(warning(
                "modified_not_applied",
                format!("Modified {kind} {name} differs from source and is left unchanged"),
            ));
        }
    }
}

fn error(rule: &str, message: String) -> SafetyIssue {
    SafetyIssue {
        rule: rule.to_string(),
        severity: IssueSeverity::Error,
        message,
    }
}

fn warning(rule: &str, message: String) -> SafetyIssue {
    SafetyIssue {
        rule: rule.to_string(),
        severity: IssueSeverity::Warning,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loader::parse_comparison;

    fn comparison(differences: &str, critical: u64) -> SchemaComparison {
        parse_comparison(&format!(
            r#"{{ "summary": {{ "critical_differences": {critical} }}, "differences": {differences} }}"#
        ))
        .unwrap()
    }

    #[test]
    fn clean_comparison_passes() {
        let report = validate_comparison(&comparison("{}", 0));
        assert!(report.ok);
        assert!(report.issues.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn critical_differences_fail() {
        let report = validate_comparison(&comparison("{}", 2));
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].rule, "critical_differences");
    }

    #[test]
    fn incompatible_type_change_fails_with_one_issue() {
        let report = validate_comparison(&comparison(
            r#"{ "columns": { "modified": [ {
                "table": "orders", "column": "reference",
                "differences": [ {
                    "type": "data_type", "source_value": "integer", "target_value": "text",
                    "compatibility": "incompatible"
                } ]
            } ] } }"#,
            0,
        ));
        assert!(!report.ok);
        assert_eq!(report.issue_messages().len(), 1);
        assert_eq!(report.issues[0].rule, "incompatible_type_change");
        assert!(report.issues[0].message.contains("orders.reference"));
    }

    #[test]
    fn compatible_type_change_only_warns() {
        let report = validate_comparison(&comparison(
            r#"{ "columns": { "modified": [ {
                "table": "orders", "column": "quantity",
                "differences": [ {
                    "type": "data_type", "source_value": "bigint", "target_value": "integer",
                    "compatibility": "compatible"
                } ]
            } ] } }"#,
            0,
        ));
        assert!(report.ok);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].rule, "modified_not_applied");
    }

    #[test]
    fn high_risk_not_null_fails() {
        let report = validate_comparison(&comparison(
            r#"{ "columns": { "modified": [ {
                "table": "customers", "column": "email",
                "differences": [ {
                    "type": "is_nullable", "source_value": "NO", "target_value": "YES",
                    "risk": "high"
                } ]
            } ] } }"#,
            0,
        ));
        assert!(!report.ok);
        assert_eq!(report.issues[0].rule, "unsafe_not_null");
    }

    #[test]
    fn low_risk_not_null_passes() {
        let report = validate_comparison(&comparison(
            r#"{ "columns": { "modified": [ {
                "table": "customers", "column": "email",
                "differences": [ {
                    "type": "is_nullable", "source_value": "NO", "target_value": "YES",
                    "risk": "low"
                } ]
            } ] } }"#,
            0,
        ));
        assert!(report.ok);
    }

    #[test]
    fn high_risk_index_modification_is_destructive() {
        let report = validate_comparison(&comparison(
            r#"{ "indexes": { "modified": [ {
                "table": "orders", "index": "orders_status_idx",
                "differences": [ { "type": "columns", "source_value": ["status", "created_at"],
                                   "target_value": ["status"], "risk": "high" } ]
            } ] } }"#,
            0,
        ));
        assert!(!report.ok);
        assert_eq!(report.issues[0].rule, "destructive_modification");
    }

    #[test]
    fn missing_in_source_only_warns() {
        let report = validate_comparison(&comparison(
            r#"{
                "tables": { "missing_in_source": [ { "name": "audit_log" } ] },
                "columns": { "missing_in_source": [
                    { "table": "orders", "column": "legacy", "data_type": "text" },
                    { "table": "orders", "column": "legacy2", "data_type": "text" }
                ] }
            }"#,
            0,
        ));
        assert!(report.ok);
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .all(|w| w.message.contains("ignored for safety")));
    }

    #[test]
    fn exclusion_constraint_only_in_target_warns() {
        let report = validate_comparison(&comparison(
            r#"{
                "constraints": { "missing_in_source": [
                    { "table": "bookings", "constraint": "bookings_no_overlap", "type": "EXCLUDE",
                      "check_clause": "EXCLUDE USING gist (room WITH =, during WITH &&)" }
                ] }
            }"#,
            0,
        ));
        assert!(report.ok);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].rule, "missing_in_source");
        assert!(report.warnings[0].message.contains("1 constraint(s)"));
    }

    #[test]
    fn validation_is_deterministic() {
        let input = comparison(
            r#"{ "columns": { "modified": [ {
                "table": "a", "column": "b",
                "differences": [ { "type": "data_type", "source_value": "int", "target_value": "text",
                                   "compatibility": "incompatible" } ]
            } ] } }"#,
            3,
        );
        assert_eq!(validate_comparison(&input), validate_comparison(&input));
    }
}
