//! Append-only history of script runs, persisted through the provider.

use crate::error::{MigrateError, MigrateResult};
use keel_core::{NewScriptRun, ScriptHistory, ScriptRun};
use keel_db::{DbError, Provider, ProviderCore, ProviderHistory};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// History store for one run.
///
/// The latest and last successful row per script are read once when the
/// store is opened and kept current as rows are appended. A detached store (dry run against a missing
/// database or history table) behaves as an empty history and never writes.
pub struct HistoryStore {
    provider: Arc<dyn Provider>,
    scripts: HashMap<String, ScriptHistory>,
    attached: bool,
}

impl HistoryStore {
    /// Create the history table if needed and load it.
    pub async fn open(provider: Arc<dyn Provider>) -> MigrateResult<Self> {
        provider
            .ensure_history_table()
            .await
            .map_err(MigrateError::History)?;
        Self::load(provider).await
    }

    /// Load an existing history table; a missing one gives a detached store.
    pub async fn open_read_only(provider: Arc<dyn Provider>) -> MigrateResult<Self> {
        if provider
            .history_exists()
            .await
            .map_err(MigrateError::History)?
        {
            Self::load(provider).await
        } else {
            Ok(Self::detached(provider))
        }
    }

    /// A store with no backing table.
    pub fn detached(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            scripts: HashMap::new(),
            attached: false,
        }
    }

    async fn load(provider: Arc<dyn Provider>) -> MigrateResult<Self> {
        let scripts = provider
            .script_histories()
            .await
            .map_err(MigrateError::History)?;
        log::debug!("Loaded history for {} script(s)", scripts.len());
        Ok(Self {
            provider,
            scripts,
            attached: true,
        })
    }

    /// Whether rows are read from and written to a real table.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Recorded history of a script, if it ever ran.
    pub fn history_for(&self, script_name: &str) -> Option<&ScriptHistory> {
        self.scripts.get(&self.provider.fold_name(script_name))
    }

    /// Append a row. Runs inside the provider's active transaction, if any.
    pub async fn append(&mut self, row: NewScriptRun) -> MigrateResult<ScriptRun> {
        if !self.attached {
            return Err(MigrateError::History(DbError::NotConnected));
        }
        let id = self
            .provider
            .append_run(&row)
            .await
            .map_err(MigrateError::History)?;
        let run = row.into_run(id);
        match self.scripts.entry(self.provider.fold_name(&run.script_name)) {
            Entry::Occupied(mut entry) => entry.get_mut().observe(run.clone()),
            Entry::Vacant(entry) => {
                entry.insert(ScriptHistory::new(run.clone()));
            }
        }
        Ok(run)
    }

    /// Every row, oldest first.
    pub async fn all_runs(&self) -> MigrateResult<Vec<ScriptRun>> {
        if !self.attached {
            return Ok(Vec::new());
        }
        self.provider
            .all_runs()
            .await
            .map_err(MigrateError::History)
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
