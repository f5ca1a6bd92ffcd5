//! Migration run report
//!
//! A [`MigrationReport`] is built up while a run progresses and describes
//! what happened to every script considered. It can be printed or saved to
//! disk for later inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::folder::ExecutionPolicy;

/// Orchestrator state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    EnsuringDatabase,
    EnsuringHistory,
    Migrating,
    Completed,
    Aborted,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Aborted)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::EnsuringDatabase => "ensuring_database",
            RunStatus::EnsuringHistory => "ensuring_history",
            RunStatus::Migrating => "migrating",
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// What happened to one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptAction {
    /// Executed and recorded as success
    Executed,
    /// Not executed; history says it is up to date
    Skipped,
    /// Environment script not applicable to the configured environment
    SkippedEnvironment,
    /// Recorded as success without executing (baseline mode)
    Baselined,
    /// Would execute (dry run)
    WouldRun,
    /// Execution failed
    Failed,
    /// RunOnce script whose content changed
    PolicyViolation,
    /// Executed or baselined, then undone by a whole-run rollback
    RolledBack,
}

impl std::fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScriptAction::Executed => "executed",
            ScriptAction::Skipped => "skipped",
            ScriptAction::SkippedEnvironment => "skipped (environment)",
            ScriptAction::Baselined => "baselined",
            ScriptAction::WouldRun => "would run",
            ScriptAction::Failed => "failed",
            ScriptAction::PolicyViolation => "policy violation",
            ScriptAction::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// Per-script entry in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptReport {
    pub script_name: String,
    pub folder_role: String,
    pub policy: ExecutionPolicy,
    pub content_hash: String,
    pub action: ScriptAction,

    /// Execution time (0 when not executed)
    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counts per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub executed: usize,
    pub skipped: usize,
    pub baselined: usize,
    pub would_run: usize,
    pub failed: usize,
    pub policy_violations: usize,
    pub rolled_back: usize,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique identifier for this run, also written to every history row
    pub run_id: String,

    /// Physical database name once resolved, otherwise the configured one
    pub database: String,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    pub dry_run: bool,

    /// Whether the database was created by this run
    pub database_created: bool,

    pub scripts: Vec<ScriptReport>,

    /// Fatal error that aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationReport {
    /// Start a new report with a fresh run id.
    pub fn new(database: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            database: database.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::NotStarted,
            dry_run,
            database_created: false,
            scripts: Vec::new(),
            error: None,
        }
    }

    /// Load a report from a file path
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let report: MigrationReport = serde_json::from_str(&content)?;
        Ok(Some(report))
    }

    /// Save the report to a file path atomically
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    pub fn record(&mut self, script: ScriptReport) {
        self.scripts.push(script);
    }

    /// Move to the next orchestrator state.
    pub fn transition(&mut self, status: RunStatus) {
        log::debug!("Run {}: {} -> {}", self.run_id, self.status, status);
        self.status = status;
    }

    pub fn complete(&mut self) {
        self.transition(RunStatus::Completed);
        self.finished_at = Some(Utc::now());
    }

    pub fn abort(&mut self, error: impl Into<String>) {
        self.transition(RunStatus::Aborted);
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Scripts that ended with the given action.
    /// Demote applied scripts after the whole-run transaction was rolled back.
    pub fn mark_rolled_back(&mut self) {
        for script in &mut self.scripts {
            if matches!(script.action, ScriptAction::Executed | ScriptAction::Baselined) {
                script.action = ScriptAction::RolledBack;
            }
        }
    }

    pub fn scripts_with(&self, action: ScriptAction) -> impl Iterator<Item = &ScriptReport> {
        self.scripts.iter().filter(move |s| s.action == action)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for script in &self.scripts {
            match script.action {
                ScriptAction::Executed => summary.executed += 1,
                ScriptAction::Skipped | ScriptAction::SkippedEnvironment => summary.skipped += 1,
                ScriptAction::Baselined => summary.baselined += 1,
                ScriptAction::WouldRun => summary.would_run += 1,
                ScriptAction::Failed => summary.failed += 1,
                ScriptAction::PolicyViolation => summary.policy_violations += 1,
                ScriptAction::RolledBack => summary.rolled_back += 1,
            }
        }
        summary
    }

    /// Wall-clock duration once finished.
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
