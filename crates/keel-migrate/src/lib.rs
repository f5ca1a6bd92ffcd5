//! keel-migrate - Migration engine for Keel
//!
//! This crate drives a migration run: it makes sure the target database and
//! its history table exist, walks the migrations folders in precedence
//! order, decides per script whether to run it from the execution policy
//! and the recorded history, and executes the scripts batch by batch.

pub mod error;
pub mod history;
pub mod migrator;
pub mod policy;

pub use error::{MigrateError, MigrateResult};
pub use history::HistoryStore;
pub use migrator::{DatabaseTarget, MigrateOptions, MigrationOutcome, Migrator};
pub use policy::{decide, Decision, RunReason};
