//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use keel_core::TransactionMode;

/// Keel - versioned database migrations driven by folder conventions
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override target (database connection)
    #[arg(short, long, global = true)]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring the target database up to date with the scripts
    Migrate(MigrateArgs),

    /// Show the recorded history of script runs
    History(HistoryArgs),

    /// Create a starter keel.yml and the default folder layout
    Init(InitArgs),

    /// List scripts in execution order without connecting
    Ls(LsArgs),
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Decide what would run without executing or creating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Transaction scope (overrides keel.yml)
    #[arg(long, value_enum)]
    pub transaction: Option<TransactionArg>,

    /// Fail instead of creating a missing database
    #[arg(long)]
    pub no_create_database: bool,

    /// Record scripts as applied without executing them
    #[arg(long)]
    pub baseline: bool,

    /// Re-run changed run-once scripts instead of failing
    #[arg(long)]
    pub rerun_changed_once: bool,

    /// Save the run report as JSON to this path
    #[arg(long)]
    pub report: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Transaction scope choices
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionArg {
    /// One transaction per script
    PerScript,
    /// One transaction for the whole run
    WholeRun,
}

impl From<TransactionArg> for TransactionMode {
    fn from(arg: TransactionArg) -> Self {
        match arg {
            TransactionArg::PerScript => TransactionMode::PerScript,
            TransactionArg::WholeRun => TransactionMode::WholeRun,
        }
    }
}

/// Arguments for the history command
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only show rows for this script (e.g. up/0001_init.sql)
    #[arg(short, long)]
    pub script: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Database engine for the starter config
    /// (sqlserver, postgres, mysql, oracle, sqlite, duckdb)
    #[arg(short, long, default_value = "sqlite")]
    pub database_type: String,

    /// Project name (defaults to the project directory name)
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON output
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
