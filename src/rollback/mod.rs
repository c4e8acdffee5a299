//! Inverse statements for committed changes.
//!
//! Entries are staged while a transaction is open and only become part of
//! the script once it commits.

use crate::diff::SyncOp;
use crate::pg::sqlgen::generate_inverse_sql;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackEntry {
    pub description: String,
    pub statement: String,
}

#[derive(Debug, Clone)]
pub struct RollbackHeader {
    pub database: String,
    pub environment: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RollbackScript {
    committed: Vec<RollbackEntry>,
    pending: Vec<RollbackEntry>,
}

impl RollbackScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages the inverse of an operation that just executed.
    pub fn record(&mut self, op: &SyncOp, schema: &str) {
        self.pending.push(RollbackEntry {
            description: op.describe(),
            statement: generate_inverse_sql(op, schema),
        });
    }

    pub fn commit_pending(&mut self) {
        self.committed.append(&mut self.pending);
    }

    /// Drops staged entries after a transaction rollback. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn entries(&self) -> &[RollbackEntry] {
        &self.committed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Renders the committed entries, most recent change first.
    pub fn render(&self, header: &RollbackHeader) -> String {
        let mut output = String::new();
        output.push_str("-- pgsafesync rollback script\n");
        output.push_str(&format!("-- Database: {}\n", header.database));
        output.push_str(&format!("-- Environment: {}\n", header.environment));
        output.push_str(&format!(
            "-- Generated: {}\n",
            header.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str("--\n");
        output.push_str("-- WARNING: review every statement before running this script.\n");
        output.push_str("-- Dropping these objects also drops any data written to them since the sync.\n");
        output.push('\n');
        output.push_str("BEGIN;\n\n");

        for entry in self.committed.iter().rev() {
            output.push_str(&format!("-- undo: {}\n", entry.description));
            output.push_str(&entry.statement);
            output.push_str("\n\n");
        }

        output.push_str("COMMIT;\n");
        output
    }

    /// Writes `rollback_<environment>_<timestamp>.sql` under `directory`.
    pub fn write_to(&self, directory: &Path, header: &RollbackHeader) -> io::Result<PathBuf> {
        fs::create_dir_all(directory)?;
        let path = directory.join(format!(
            "rollback_{}_{}.sql",
            header.environment,
            header.generated_at.format("%Y%m%d_%H%M%S")
        ));
        fs::write(&path, self.render(header))?;
        Ok(path)
    }
}
