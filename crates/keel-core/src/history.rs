//! History row types.
//!
//! Every script execution appends one [`ScriptRun`] to the history table in
//! the target database. Rows are never updated or deleted.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Text format used by backends that store `run_at` as a string.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Outcome of one script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    /// Value stored in the `outcome` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(RunOutcome::Success),
            "failure" => Ok(RunOutcome::Failure),
            _ => Err(CoreError::InvalidOutcome {
                value: s.to_string(),
            }),
        }
    }
}

/// A persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRun {
    /// Row id assigned by the database
    pub id: i64,
    pub script_name: String,
    pub folder_role: String,
    pub content_hash: String,
    pub run_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScriptRun {
    /// Total order used to pick the latest row for a script: run timestamp,
    /// then id.
    pub fn recency_cmp(&self, other: &ScriptRun) -> Ordering {
        self.run_at
            .cmp(&other.run_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// History of one script: its latest row and its latest successful row.
///
/// The two differ when the most recent attempt failed. Change detection
/// compares against the last success, since a failed attempt was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHistory {
    pub latest: ScriptRun,
    pub last_success: Option<ScriptRun>,
}

impl ScriptHistory {
    pub fn new(run: ScriptRun) -> Self {
        let last_success = run.is_success().then(|| run.clone());
        Self {
            latest: run,
            last_success,
        }
    }

    /// Fold another row for the same script into this history.
    pub fn observe(&mut self, run: ScriptRun) {
        if run.is_success()
            && self
                .last_success
                .as_ref()
                .map_or(true, |s| run.recency_cmp(s).is_gt())
        {
            self.last_success = Some(run.clone());
        }
        if run.recency_cmp(&self.latest).is_gt() {
            self.latest = run;
        }
    }

    /// Hash of the content last applied successfully.
    pub fn applied_hash(&self) -> Option<&str> {
        self.last_success.as_ref().map(|s| s.content_hash.as_str())
    }
}

/// A history row about to be appended (id not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScriptRun {
    pub script_name: String,
    pub folder_role: String,
    pub content_hash: String,
    pub run_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub run_id: String,
    pub error_message: Option<String>,
}

impl NewScriptRun {
    /// A success row stamped now.
    pub fn success(
        script_name: impl Into<String>,
        folder_role: impl Into<String>,
        content_hash: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            folder_role: folder_role.into(),
            content_hash: content_hash.into(),
            run_at: now(),
            outcome: RunOutcome::Success,
            run_id: run_id.into(),
            error_message: None,
        }
    }

    /// A failure row stamped now.
    pub fn failure(
        script_name: impl Into<String>,
        folder_role: impl Into<String>,
        content_hash: impl Into<String>,
        run_id: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            outcome: RunOutcome::Failure,
            error_message: Some(error_message.into()),
            ..Self::success(script_name, folder_role, content_hash, run_id)
        }
    }

    /// Attach the database-assigned id.
    pub fn into_run(self, id: i64) -> ScriptRun {
        ScriptRun {
            id,
            script_name: self.script_name,
            folder_role: self.folder_role,
            content_hash: self.content_hash,
            run_at: self.run_at,
            outcome: self.outcome,
            run_id: self.run_id,
            error_message: self.error_message,
        }
    }
}

/// Current time truncated to microseconds, the finest precision every
/// backend stores.
pub fn now() -> DateTime<Utc> {
    truncate_to_micros(Utc::now())
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`] (UTC).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`] or by a database's
/// default text rendering (`T` separator, optional fraction, optional
/// trailing offset).
pub fn parse_timestamp(value: &str) -> CoreResult<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive_part = trimmed
        .strip_suffix("+00")
        .or_else(|| trimmed.strip_suffix("+00:00"))
        .or_else(|| trimmed.strip_suffix('Z'))
        .unwrap_or(trimmed)
        .trim_end();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(CoreError::InvalidTimestamp {
        value: value.to_string(),
    })
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
