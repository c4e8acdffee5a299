//! Catalog snapshot of one PostgreSQL schema.
//!
//! Used to compare the target before and after a run.

use crate::pg::connection::PgConnection;
use crate::util::{Result, SchemaError};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    pub tables: Vec<String>,
    pub columns: Vec<CatalogColumn>,
    pub indexes: Vec<CatalogIndex>,
    pub constraints: Vec<CatalogConstraint>,
    pub sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CatalogColumn {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CatalogIndex {
    pub table: String,
    pub index: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CatalogConstraint {
    pub table: String,
    pub constraint: String,
    pub kind: String,
}

impl CatalogSnapshot {
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let json = serde_json::to_string(self).unwrap_or_default();
        let hash = Sha256::digest(json.as_bytes());
        hex::encode(hash)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.table == table && c.column == column)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.iter().any(|i| i.index == index)
    }

    pub fn has_constraint(&self, table: &str, constraint: &str) -> bool {
        self.constraints
            .iter()
            .any(|c| c.table == table && c.constraint == constraint)
    }

    pub fn has_sequence(&self, sequence: &str) -> bool {
        self.sequences.iter().any(|s| s == sequence)
    }
}

pub async fn snapshot_catalog(connection: &PgConnection, schema: &str) -> Result<CatalogSnapshot> {
    Ok(CatalogSnapshot {
        tables: snapshot_tables(connection, schema).await?,
        columns: snapshot_columns(connection, schema).await?,
        indexes: snapshot_indexes(connection, schema).await?,
        constraints: snapshot_constraints(connection, schema).await?,
        sequences: snapshot_sequences(connection, schema).await?,
    })
}

async fn snapshot_tables(connection: &PgConnection, schema: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#,
    )
    .bind(schema)
    .fetch_all(connection.pool())
    .await
    .map_err(|e| SchemaError::DatabaseError(format!("Failed to fetch tables: {e}")))?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

async fn snapshot_columns(connection: &PgConnection, schema: &str) -> Result<Vec<CatalogColumn>> {
    let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT table_name::text, column_name::text, data_type::text,
               is_nullable::text, column_default::text
        FROM information_schema.columns
        WHERE table_schema = $1
        ORDER BY table_name, ordinal_position
        "#,
    )
    .bind(schema)
    .fetch_all(connection.pool())
    .await
    .map_err(|e| SchemaError::DatabaseError(format!("Failed to fetch columns: {e}")))?;

    Ok(rows
        .into_iter()
        .map(
            |(table, column, data_type, is_nullable, column_default)| CatalogColumn {
                table,
                column,
                data_type,
                is_nullable,
                column_default,
            },
        )
        .collect())
}

async fn snapshot_indexes(connection: &PgConnection, schema: &str) -> Result<Vec<CatalogIndex>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT tablename::text, indexname::text, indexdef
        FROM pg_indexes
        WHERE schemaname = $1
        ORDER BY tablename, indexname
        "#,
    )
    .bind(schema)
    .fetch_all(connection.pool())
    .await
    .map_err(|e| SchemaError::DatabaseError(format!("Failed to fetch indexes: {e}")))?;

    Ok(rows
        .into_iter()
        .map(|(table, index, definition)| CatalogIndex {
            table,
            index,
            definition,
        })
        .collect())
}

async fn snapshot_constraints(
    connection: &PgConnection,
    schema: &str,
) -> Result<Vec<CatalogConstraint>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT c.relname::text, con.conname::text,
               CASE con.contype
                   WHEN 'p' THEN 'PRIMARY KEY'
                   WHEN 'u' THEN 'UNIQUE'
                   WHEN 'f' THEN 'FOREIGN KEY'
                   ELSE 'CHECK'
               END
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND con.contype IN ('p', 'u', 'f', 'c')
        ORDER BY c.relname, con.conname
        "#,
    )
    .bind(schema)
    .fetch_all(connection.pool())
    .await
    .map_err(|e| SchemaError::DatabaseError(format!("Failed to fetch constraints: {e}")))?;

    Ok(rows
        .into_iter()
        .map(|(table, constraint, kind)| CatalogConstraint {
            table,
            constraint,
            kind,
        })
        .collect())
}

async fn snapshot_sequences(connection: &PgConnection, schema: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT sequence_name::text
        FROM information_schema.sequences
        WHERE sequence_schema = $1
        ORDER BY sequence_name
        "#,
    )
    .bind(schema)
    .fetch_all(connection.pool())
    .await
    .map_err(|e| SchemaError::DatabaseError(format!("Failed to fetch sequences: {e}")))?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}
