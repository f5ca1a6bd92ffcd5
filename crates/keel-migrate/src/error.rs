//! Error types for keel-migrate

use keel_core::CoreError;
use keel_db::DbError;
use keel_sql::SqlError;
use thiserror::Error;

/// Migration run errors. Every variant is fatal to the run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// M001: A folder or script could not be discovered or read
    #[error("[M001] Discovery failed: {0}")]
    Discovery(#[from] CoreError),

    /// M002: A script could not be split into batches
    #[error("[M002] Cannot split script '{script}' in folder '{role}': {source}")]
    Split {
        script: String,
        role: String,
        source: SqlError,
    },

    /// M003: The target database could not be reached, found or created
    #[error("[M003] Cannot prepare database '{database}': {source}")]
    Connection { database: String, source: DbError },

    /// M004: A RunOnce script changed after it was applied
    #[error(
        "[M004] Policy violation: run-once script '{script}' in folder '{role}' has changed \
         (recorded hash {recorded_hash}, current hash {current_hash})"
    )]
    PolicyViolation {
        script: String,
        role: String,
        recorded_hash: String,
        current_hash: String,
    },

    /// M005: A batch failed to execute
    #[error("[M005] Script '{script}' in folder '{role}' failed at batch {batch_index}{}: {source}", recorded_suffix(.recorded))]
    SqlExecution {
        script: String,
        role: String,
        /// 1-based position of the failing batch in the script
        batch_index: usize,
        /// Whether a failure row reached the history table
        recorded: bool,
        source: DbError,
    },

    /// M006: Begin, commit or rollback failed
    #[error("[M006] Transaction control failed for '{script}'{}: {source}", recorded_suffix(.recorded))]
    Transaction {
        script: String,
        recorded: bool,
        source: DbError,
    },

    /// M007: The history table could not be created, read or written
    #[error("[M007] History store error: {0}")]
    History(DbError),

    /// M008: Run options could not be resolved from configuration
    #[error("[M008] Invalid configuration: {0}")]
    Config(CoreError),
}

fn recorded_suffix(recorded: &bool) -> &'static str {
    if *recorded {
        ""
    } else {
        " (failure not recorded in history)"
    }
}

/// Result type alias for MigrateError
pub type MigrateResult<T> = Result<T, MigrateError>;

impl MigrateError {
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, MigrateError::PolicyViolation { .. })
    }

    /// Whether a script failed while executing (as opposed to failing to
    /// start the run).
    pub fn is_script_failure(&self) -> bool {
        matches!(
            self,
            MigrateError::SqlExecution { .. } | MigrateError::Transaction { .. }
        )
    }

    /// Whether a failure row was written for the failing script.
    pub fn is_recorded(&self) -> bool {
        match self {
            MigrateError::SqlExecution { recorded, .. }
            | MigrateError::Transaction { recorded, .. } => *recorded,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
