//! History table naming and row decoding shared by all backends.

use crate::error::DbResult;
use keel_core::history::parse_timestamp;
use keel_core::{HistoryConfig, RunOutcome, ScriptHistory, ScriptRun};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Location of the history table.
///
/// Engines with schemas place the table inside `schema`; the others use the
/// flat name `<schema>_<table>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTable {
    pub schema: String,
    pub table: String,
}

impl HistoryTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Table name for engines without schemas.
    pub fn flat_name(&self) -> String {
        format!("{}_{}", self.schema, self.table)
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for HistoryTable {
    fn from(config: &HistoryConfig) -> Self {
        Self::new(&config.schema, &config.table)
    }
}

/// Column list in the order every backend selects it.
pub(crate) const SELECT_COLUMNS: &str =
    "id, script_name, folder_role, content_hash, run_at, outcome, run_id, error_message";

/// Raw column values of one history row, timestamp already rendered as text.
pub(crate) struct RawRun {
    pub id: i64,
    pub script_name: String,
    pub folder_role: String,
    pub content_hash: String,
    pub run_at: String,
    pub outcome: String,
    pub run_id: String,
    pub error_message: Option<String>,
}

impl RawRun {
    pub fn decode(self) -> DbResult<ScriptRun> {
        let run_at = parse_timestamp(&self.run_at)?;
        let outcome: RunOutcome = self.outcome.parse()?;
        Ok(ScriptRun {
            id: self.id,
            script_name: self.script_name,
            folder_role: self.folder_role,
            content_hash: self.content_hash,
            run_at,
            outcome,
            run_id: self.run_id,
            error_message: self.error_message,
        })
    }
}

/// Latest and latest successful row per script, keyed by `fold(script_name)`.
///
/// Latest means greatest `(run_at, id)`.
pub fn history_by_script(
    runs: Vec<ScriptRun>,
    fold: impl Fn(&str) -> String,
) -> HashMap<String, ScriptHistory> {
    let mut histories: HashMap<String, ScriptHistory> = HashMap::new();
    for run in runs {
        match histories.entry(fold(&run.script_name)) {
            Entry::Occupied(mut entry) => entry.get_mut().observe(run),
            Entry::Vacant(entry) => {
                entry.insert(ScriptHistory::new(run));
            }
        }
    }
    histories
}

#[cfg(test)]
#[path = "history_table_test.rs"]
mod tests;
