//! Typed representation of a precomputed schema comparison.
//!
//! The comparison is produced by an external diffing tool. Every entity kind is
//! split into what the target lacks, what the source lacks and what differs.
//! Only `missing_in_target` ever turns into DDL.

pub mod loader;

use serde::{Deserialize, Serialize};

/// Root of a comparison document. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaComparison {
    #[serde(default)]
    pub metadata: ComparisonMetadata,
    pub summary: ComparisonSummary,
    pub differences: Differences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonMetadata {
    #[serde(default)]
    pub source: DatabaseRef,
    #[serde(default)]
    pub target: DatabaseRef,
    #[serde(default)]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseRef {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonSummary {
    pub critical_differences: u64,
    #[serde(default)]
    pub total_differences: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Differences {
    #[serde(default)]
    pub sequences: EntityDiff<SequenceSpec>,
    #[serde(default)]
    pub tables: EntityDiff<TableSpec>,
    #[serde(default)]
    pub columns: EntityDiff<ColumnSpec>,
    #[serde(default)]
    pub indexes: EntityDiff<IndexSpec>,
    #[serde(default)]
    pub constraints: EntityDiff<ConstraintSpec>,
}

/// Differences for one entity kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDiff<T> {
    /// Present in source, absent in target. Candidates for creation.
    #[serde(default = "Vec::new")]
    pub missing_in_target: Vec<T>,
    /// Present in target, absent in source. Informational only, never dropped,
    /// so entries are kept untyped and only counted.
    #[serde(default = "Vec::new")]
    pub missing_in_source: Vec<serde_json::Value>,
    #[serde(default = "Vec::new")]
    pub modified: Vec<ModifiedEntity<T>>,
}

impl<T> Default for EntityDiff<T> {
    fn default() -> Self {
        Self {
            missing_in_target: Vec::new(),
            missing_in_source: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<T> EntityDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.missing_in_target.is_empty()
            && self.missing_in_source.is_empty()
            && self.modified.is_empty()
    }
}

/// An entity present on both sides whose definitions differ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModifiedEntity<T> {
    #[serde(default, alias = "table_name")]
    pub table: Option<String>,
    #[serde(
        default,
        alias = "column",
        alias = "column_name",
        alias = "index",
        alias = "index_name",
        alias = "constraint",
        alias = "constraint_name",
        alias = "sequence_name"
    )]
    pub name: Option<String>,
    #[serde(default = "Vec::new")]
    pub differences: Vec<FieldDifference>,
    /// Source-side definition, when the producer includes it.
    #[serde(default = "Option::default")]
    pub source: Option<T>,
}

impl<T> ModifiedEntity<T> {
    /// `table.name`, `table` or `name`, whichever identifies the entity.
    pub fn display_name(&self) -> String {
        match (&self.table, &self.name) {
            (Some(table), Some(name)) => format!("{table}.{name}"),
            (Some(table), None) => table.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDifference {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source_value: serde_json::Value,
    #[serde(default)]
    pub target_value: serde_json::Value,
    #[serde(default)]
    pub compatibility: Option<Compatibility>,
    #[serde(default)]
    pub risk: Option<Risk>,
}

impl FieldDifference {
    pub fn is_data_type_change(&self) -> bool {
        self.kind.eq_ignore_ascii_case("data_type")
    }

    /// Source requires NOT NULL while the target column still allows NULLs.
    pub fn adds_not_null(&self) -> bool {
        self.kind.eq_ignore_ascii_case("is_nullable")
            && value_is_no(&self.source_value)
            && !value_is_no(&self.target_value)
    }

    pub fn is_incompatible(&self) -> bool {
        self.compatibility == Some(Compatibility::Incompatible)
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk == Some(Risk::High)
    }
}

fn value_is_no(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("no"),
        serde_json::Value::Bool(b) => !b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    Compatible,
    Incompatible,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    #[serde(alias = "critical")]
    High,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSpec {
    #[serde(alias = "table_name", alias = "table")]
    pub name: String,
    /// Source-declared column order.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default, alias = "table_comment")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Empty inside a companion table definition until the loader fills it in.
    #[serde(default, alias = "table_name")]
    pub table: String,
    #[serde(alias = "column_name")]
    pub column: String,
    pub data_type: String,
    #[serde(default)]
    pub udt_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub character_maximum_length: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub numeric_precision: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub numeric_scale: Option<i64>,
    #[serde(default = "default_true", with = "yes_no")]
    pub is_nullable: bool,
    #[serde(default)]
    pub column_default: Option<String>,
    #[serde(default, alias = "comment")]
    pub column_comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub ordinal_position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSpec {
    #[serde(alias = "table_name")]
    pub table: String,
    #[serde(alias = "index_name", alias = "name")]
    pub index: String,
    #[serde(
        default,
        alias = "column",
        alias = "column_names",
        deserialize_with = "one_or_many::deserialize"
    )]
    pub columns: Vec<String>,
    #[serde(default, with = "yes_no")]
    pub is_unique: bool,
    /// Primary-key-backed indexes come from constraint creation, never on their own.
    #[serde(default, with = "yes_no")]
    pub is_primary: bool,
    #[serde(default)]
    pub method: IndexMethod,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexMethod {
    #[default]
    #[serde(rename = "btree")]
    BTree,
    Hash,
    Gin,
    Gist,
    #[serde(rename = "spgist")]
    SpGist,
    Brin,
    /// Any access method without DDL support here.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintSpec {
    #[serde(alias = "table_name")]
    pub table: String,
    #[serde(alias = "constraint_name", alias = "name")]
    pub constraint: String,
    #[serde(rename = "type", alias = "constraint_type")]
    pub kind: ConstraintKind,
    #[serde(
        default,
        alias = "column",
        alias = "column_name",
        deserialize_with = "one_or_many::deserialize"
    )]
    pub columns: Vec<String>,
    #[serde(default, alias = "foreign_table_name")]
    pub foreign_table: Option<String>,
    #[serde(
        default,
        alias = "foreign_column",
        alias = "foreign_column_name",
        deserialize_with = "one_or_many::deserialize"
    )]
    pub foreign_columns: Vec<String>,
    #[serde(default)]
    pub update_rule: Option<ReferentialAction>,
    #[serde(default)]
    pub delete_rule: Option<ReferentialAction>,
    #[serde(default)]
    pub check_clause: Option<String>,
}

/// Declaration order is creation order: foreign keys need their referenced key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintKind {
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey,
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "FOREIGN KEY")]
    ForeignKey,
    #[serde(rename = "CHECK")]
    Check,
    /// EXCLUDE, constraint triggers and anything else that cannot be created here.
    #[serde(other)]
    Other,
}

impl ConstraintKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Check => "CHECK",
            ConstraintKind::Other => "UNSUPPORTED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferentialAction {
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceSpec {
    #[serde(alias = "sequence_name")]
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub start_value: Option<i64>,
    #[serde(
        default,
        alias = "increment_by",
        deserialize_with = "lenient_i64::deserialize"
    )]
    pub increment: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub minimum_value: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64::deserialize")]
    pub maximum_value: Option<i64>,
    #[serde(default, with = "yes_no")]
    pub cycle_option: bool,
}

/// Companion document listing full source table definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSchema {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl SourceSchema {
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}

fn default_true() -> bool {
    true
}

/// `YES`/`NO` flags as `information_schema` reports them; JSON booleans also accepted.
mod yes_no {
    use serde::de::{self, Unexpected};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "YES" } else { "NO" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(flag) => Ok(flag),
            Raw::Text(text) => match text.trim().to_ascii_uppercase().as_str() {
                "YES" | "Y" | "TRUE" => Ok(true),
                "NO" | "N" | "FALSE" => Ok(false),
                _ => Err(de::Error::invalid_value(
                    Unexpected::Str(&text),
                    &"YES or NO",
                )),
            },
        }
    }
}

/// Accepts a single name or a list of names.
mod one_or_many {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(Raw::One(name)) => vec![name],
            Some(Raw::Many(names)) => names,
        })
    }
}

/// Integers that may arrive as numeric strings.
mod lenient_i64 {
    use serde::de::{self, Unexpected};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Int(value)) => Ok(Some(value)),
            Some(Raw::Text(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| de::Error::invalid_value(Unexpected::Str(&text), &"an integer")),
        }
    }
}
