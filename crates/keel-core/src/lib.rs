//! keel-core - Core library for Keel
//!
//! This crate provides the shared types used across all Keel components:
//! configuration parsing, migrations folder roles and execution policies,
//! content checksums, natural ordering, script discovery, history row types
//! and the run report.

pub mod checksum;
pub mod config;
pub mod discovery;
pub mod error;
pub mod folder;
pub mod history;
pub mod natural_sort;
mod newtype_string;
pub mod report;
pub mod script;
pub(crate) mod serde_helpers;

pub use checksum::compute_checksum;
pub use config::{Config, DatabaseConfig, DbType, FolderConfig, HistoryConfig, TransactionMode};
pub use discovery::{discover, FolderScripts};
pub use error::{CoreError, CoreResult};
pub use folder::{ExecutionPolicy, MigrationsFolder, RoleName};
pub use history::{NewScriptRun, RunOutcome, ScriptHistory, ScriptRun};
pub use natural_sort::natural_cmp;
pub use report::{MigrationReport, ReportSummary, RunStatus, ScriptAction, ScriptReport};
pub use script::{ScriptName, ScriptUnit};
