//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keel_core::{Config, DatabaseConfig};
use keel_db::{create_provider, Provider};
use keel_migrate::{MigrateError, MigrateOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Process exit code for errors that are not script outcomes.
pub(crate) const EXIT_ERROR: i32 = 1;

/// Process exit code for a changed run-once script.
pub(crate) const EXIT_POLICY_VIOLATION: i32 = 3;

/// Process exit code for a script that failed to execute.
pub(crate) const EXIT_SCRIPT_FAILURE: i32 = 4;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Already reported by the command; main prints nothing for it
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Exit code for a failed migration run.
pub(crate) fn exit_code_for(error: &MigrateError) -> i32 {
    if error.is_policy_violation() {
        EXIT_POLICY_VIOLATION
    } else if error.is_script_failure() {
        EXIT_SCRIPT_FAILURE
    } else {
        EXIT_ERROR
    }
}

/// A loaded project: its directory, configuration and active target.
#[derive(Debug)]
pub(crate) struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub target: Option<String>,
}

impl Project {
    /// Database settings for the active target. Relative file-engine
    /// directories resolve against the project directory.
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        let mut database = self
            .config
            .get_database_config(self.target.as_deref())
            .context("Failed to resolve database configuration")?;
        if database.db_type.is_file_based() && Path::new(&database.directory).is_relative() {
            database.directory = self
                .root
                .join(&database.directory)
                .to_string_lossy()
                .into_owned();
        }
        Ok(database)
    }

    /// Provider for the active target. Connects lazily.
    pub fn provider(&self) -> Result<Arc<dyn Provider>> {
        let database = self.database_config()?;
        create_provider(&database, &self.config.history).with_context(|| {
            format!(
                "Failed to set up {} provider for '{}'",
                database.db_type, database.name
            )
        })
    }

    /// Run options resolved from the configuration and active target.
    pub fn migrate_options(&self) -> Result<MigrateOptions> {
        let mut options =
            MigrateOptions::from_config(&self.config, self.target.as_deref(), &self.root)?;
        options.server_name = self.database_config()?.server_label();
        Ok(options)
    }
}

/// Load the project named by the global arguments.
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    let root = PathBuf::from(&global.project_dir);
    let config = match &global.config {
        Some(path) => Config::load(Path::new(path)),
        None => Config::load_from_dir(&root),
    }
    .context("Failed to load project")?;
    let target = Config::resolve_target(global.target.as_deref());
    if let Some(target) = &target {
        log::debug!("Using target '{}'", target);
    }
    Ok(Project {
        root,
        config,
        target,
    })
}

/// Initialize logging. `--verbose` raises the default level to debug;
/// `RUST_LOG` takes precedence when set.
pub(crate) fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .try_init();
}

/// Timestamp as shown in tables.
pub(crate) fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// First `len` characters of a hash or id.
pub(crate) fn short(value: &str, len: usize) -> &str {
    match value.char_indices().nth(len) {
        Some((i, _)) => &value[..i],
        None => value,
    }
}

/// Print `data` as pretty JSON to stdout.
pub(crate) fn print_json<T: serde::Serialize + ?Sized>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Table-printing utilities
// ---------------------------------------------------------------------------

/// Calculate column widths for a table given headers and row data.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a left-aligned table with a dashed separator under the header.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
