//! Convenient re-exports for common pgsafesync usage.
//!
//! # Example
//!
//! ```no_run
//! use pgsafesync::prelude::*;
//!
//! let report = sync_blocking(SyncOptions::new("comparison.json").apply()).unwrap();
//! println!("Created {} object(s)", report.counters.total_changes());
//! ```

// Entry points
pub use crate::api::{sync, sync_blocking};

// Options and errors
pub use crate::api::{Error, RunFailure, SyncOptions};
pub use crate::config::{load_config, Config, EnvironmentConfig};

// Results
pub use crate::report::{
    generate_text_report, OperationOutcome, OperationStatus, RunReport, RunState, SyncCounters,
};

// Core types
pub use crate::diff::planner::{plan_sync, PlanOptions};
pub use crate::diff::{PhaseKind, SyncOp, SyncPlan};
pub use crate::model::loader::load_comparison;
pub use crate::model::SchemaComparison;
pub use crate::validate::{validate_comparison, SafetyIssue, ValidationReport};
