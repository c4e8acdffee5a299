//! pgsafesync - additive-only PostgreSQL schema synchronization.
//!
//! Reads a schema comparison document (source vs target), rejects unsafe
//! comparisons, and creates what the target is missing: sequences, tables,
//! columns, indexes and constraints. Nothing is ever dropped or altered.
//!
//! # Quick Start
//!
//! ```no_run
//! use pgsafesync::prelude::*;
//!
//! let report = sync_blocking(SyncOptions::new("comparison.json")).unwrap();
//! println!("{}", generate_text_report(&report));
//! ```
//!
//! # Modules
//!
//! - [`api`] - Run coordinator with async and blocking entry points
//! - [`model`] - Comparison document types and loading
//! - [`validate`] - Safety checks on a comparison
//! - [`diff`] - Phased additive plan
//! - [`apply`] - Transactional execution
//! - [`rollback`] - Inverse script for committed changes
//! - [`backup`] - Pre-apply dump

pub mod api;
pub mod apply;
pub mod backup;
pub mod config;
pub mod diff;
pub mod logging;
pub mod model;
pub mod pg;
pub mod prelude;
pub mod report;
pub mod rollback;
pub mod util;
pub mod validate;
