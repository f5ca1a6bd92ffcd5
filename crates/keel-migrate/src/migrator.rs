//! Migration run orchestrator
//!
//! A run moves through NotStarted -> EnsuringDatabase -> EnsuringHistory ->
//! Migrating and ends Completed or Aborted. Scripts run strictly one at a
//! time, folder by folder in precedence order, and the first failure aborts
//! the run.

use crate::error::{MigrateError, MigrateResult};
use crate::history::HistoryStore;
use crate::policy::{decide, Decision, RunReason};
use keel_core::{
    discover, Config, MigrationReport, MigrationsFolder, NewScriptRun, RunStatus,
    ScriptAction, ScriptReport, ScriptRun, ScriptUnit, TransactionMode,
};
use keel_db::{DbError, Provider, ProviderCatalog, ProviderCore};
use keel_sql::{replace_tokens, split_batches, Batch, TokenMap};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Script label used for transaction errors that span the whole run.
const WHOLE_RUN: &str = "(whole run)";

/// Settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Target database name as configured
    pub database: String,

    /// Server description, exposed as the `{{ServerName}}` token
    pub server_name: String,

    /// Directory holding the migrations folders
    pub scripts_root: PathBuf,

    /// Folders to run, ordered by precedence
    pub folders: Vec<MigrationsFolder>,

    pub transaction: TransactionMode,

    /// Decide without executing or creating anything
    pub dry_run: bool,

    /// Create the database when it does not exist
    pub create_database: bool,

    /// Record scripts that would run as applied, without executing them
    pub baseline: bool,

    /// Re-run changed RunOnce scripts instead of failing
    pub rerun_changed_once: bool,

    /// Environment used to select `.env.` scripts
    pub environment: Option<String>,

    /// User tokens for `{{Token}}` replacement
    pub tokens: HashMap<String, String>,
}

impl MigrateOptions {
    /// Options with defaults: per-script transactions, database creation
    /// allowed, no environment and no tokens.
    pub fn new(
        database: impl Into<String>,
        scripts_root: impl Into<PathBuf>,
        folders: Vec<MigrationsFolder>,
    ) -> Self {
        Self {
            database: database.into(),
            server_name: String::new(),
            scripts_root: scripts_root.into(),
            folders,
            transaction: TransactionMode::PerScript,
            dry_run: false,
            create_database: true,
            baseline: false,
            rerun_changed_once: false,
            environment: None,
            tokens: HashMap::new(),
        }
    }

    /// Resolve options from a project config and optional target.
    pub fn from_config(
        config: &Config,
        target: Option<&str>,
        project_root: &Path,
    ) -> MigrateResult<Self> {
        let database = config
            .get_database_config(target)
            .map_err(MigrateError::Config)?;
        Ok(Self {
            database: database.name.clone(),
            server_name: database.server_label(),
            scripts_root: config.scripts_dir_absolute(project_root),
            folders: config.migrations_folders(),
            transaction: config.transaction,
            dry_run: config.dry_run,
            create_database: config.create_database,
            baseline: false,
            rerun_changed_once: false,
            environment: config
                .get_environment(target)
                .map_err(MigrateError::Config)?,
            tokens: config
                .get_merged_tokens(target)
                .map_err(MigrateError::Config)?
                .into_owned(),
        })
    }
}

/// The target database as resolved for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    /// Name as configured
    pub name: String,

    /// `name` after the provider's name folding
    pub folded: String,

    /// Physical name; `None` in a dry run when the database does not exist
    pub physical: Option<String>,

    /// Created by this run (in a dry run: would be created)
    pub created: bool,
}

/// A finished run. The report is produced whether or not the run succeeded.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub report: MigrationReport,
    pub result: MigrateResult<()>,
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> MigrateResult<MigrationReport> {
        self.result.map(|()| self.report)
    }
}

/// Mutable state threaded through the Migrating phase.
struct RunState {
    run_id: String,
    tokens: TokenMap,
    history: HistoryStore,
    /// Whether `only_after_create` folders run
    fresh: bool,
    sequence: usize,
    /// First policy violation seen in a dry run
    violation: Option<MigrateError>,
}

/// Drives migration runs against one provider.
pub struct Migrator {
    provider: Arc<dyn Provider>,
    options: MigrateOptions,
}

impl Migrator {
    pub fn new(provider: Arc<dyn Provider>, options: MigrateOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &MigrateOptions {
        &self.options
    }

    /// Run the migration. The connection is closed before returning.
    pub async fn run(&self) -> MigrationOutcome {
        let mut report = MigrationReport::new(&self.options.database, self.options.dry_run);
        log::info!(
            "Starting migration {} of '{}' on {}{}",
            report.run_id,
            self.options.database,
            self.provider.db_type(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let result = self.run_phases(&mut report).await;

        if let Err(e) = self.provider.close().await {
            log::warn!("Failed to close connection: {}", e);
        }

        match &result {
            Ok(()) => {
                report.complete();
                let summary = report.summary();
                log::info!(
                    "Migration {} completed: {} executed, {} skipped, {} baselined, {} would run",
                    report.run_id,
                    summary.executed,
                    summary.skipped,
                    summary.baselined,
                    summary.would_run
                );
            }
            Err(e) => {
                log::error!("Migration {} aborted: {}", report.run_id, e);
                report.abort(e.to_string());
            }
        }

        MigrationOutcome { report, result }
    }

    /// Read the full history of the target without creating anything.
    /// Returns `None` when the database or its history table does not exist.
    pub async fn history(&self) -> MigrateResult<Option<Vec<ScriptRun>>> {
        let result = self.read_history().await;
        if let Err(e) = self.provider.close().await {
            log::warn!("Failed to close connection: {}", e);
        }
        result
    }

    async fn read_history(&self) -> MigrateResult<Option<Vec<ScriptRun>>> {
        let name = &self.options.database;
        let connection = |source: DbError| MigrateError::Connection {
            database: name.clone(),
            source,
        };
        let Some(physical) = self.provider.find_database(name).await.map_err(connection)? else {
            return Ok(None);
        };
        self.provider.open(&physical).await.map_err(connection)?;
        let store = HistoryStore::open_read_only(Arc::clone(&self.provider)).await?;
        if !store.is_attached() {
            return Ok(None);
        }
        Ok(Some(store.all_runs().await?))
    }

    async fn run_phases(&self, report: &mut MigrationReport) -> MigrateResult<()> {
        report.transition(RunStatus::EnsuringDatabase);
        let target = self.ensure_database().await?;
        if let Some(physical) = &target.physical {
            report.database = physical.clone();
        }
        report.database_created = target.created && !self.options.dry_run;

        report.transition(RunStatus::EnsuringHistory);
        let history = self.open_history(&target).await?;

        report.transition(RunStatus::Migrating);
        let mut state = RunState {
            run_id: report.run_id.clone(),
            tokens: self.token_map(&target, &report.run_id),
            history,
            fresh: target.created,
            sequence: 0,
            violation: None,
        };

        let whole_run = self.options.transaction == TransactionMode::WholeRun
            && !self.options.dry_run;
        let run_transaction = |source: DbError| MigrateError::Transaction {
            script: WHOLE_RUN.to_string(),
            recorded: false,
            source,
        };

        if whole_run {
            self.provider.begin().await.map_err(run_transaction)?;
        }

        let mut result = self.migrate_folders(&mut state, report).await;
        if whole_run {
            result = match result {
                Ok(()) => self.provider.commit().await.map_err(run_transaction),
                Err(e) => Err(e),
            };
            if result.is_err() {
                // Nothing from the run survives; failure rows are written
                // after the rollback and are already committed.
                match self.provider.rollback().await {
                    Ok(()) => report.mark_rolled_back(),
                    Err(e) => log::error!("Rollback of whole-run transaction failed: {}", e),
                }
            }
        }
        result?;

        match state.violation.take() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    /// Find the target database, creating it when allowed, and open it.
    async fn ensure_database(&self) -> MigrateResult<DatabaseTarget> {
        let name = &self.options.database;
        let connection = |source: DbError| MigrateError::Connection {
            database: name.clone(),
            source,
        };

        let (physical, created) = if self.options.dry_run {
            match self.provider.find_database(name).await.map_err(connection)? {
                Some(physical) => (Some(physical), false),
                None if self.options.create_database => {
                    log::info!("Database '{}' does not exist and would be created", name);
                    (None, true)
                }
                None => {
                    return Err(connection(DbError::DatabaseNotFound { name: name.clone() }));
                }
            }
        } else {
            let (physical, created) = self
                .provider
                .ensure_database(name, self.options.create_database)
                .await
                .map_err(connection)?;
            if created {
                log::info!("Created database '{}'", physical);
            } else {
                log::debug!("Found database '{}' as '{}'", name, physical);
            }
            (Some(physical), created)
        };

        if let Some(physical) = &physical {
            self.provider.open(physical).await.map_err(connection)?;
        }

        Ok(DatabaseTarget {
            name: name.clone(),
            folded: self.provider.fold_name(name),
            physical,
            created,
        })
    }

    async fn open_history(&self, target: &DatabaseTarget) -> MigrateResult<HistoryStore> {
        let provider = Arc::clone(&self.provider);
        match (&target.physical, self.options.dry_run) {
            (None, _) => Ok(HistoryStore::detached(provider)),
            (Some(_), true) => HistoryStore::open_read_only(provider).await,
            (Some(_), false) => HistoryStore::open(provider).await,
        }
    }

    /// User tokens plus the built-ins, which take precedence.
    fn token_map(&self, target: &DatabaseTarget, run_id: &str) -> TokenMap {
        let mut tokens = TokenMap::new();
        tokens.extend(&self.options.tokens);
        tokens.insert("DatabaseName", target.name.as_str());
        tokens.insert("ServerName", self.options.server_name.as_str());
        tokens.insert(
            "Environment",
            self.options.environment.as_deref().unwrap_or_default(),
        );
        tokens.insert("RunId", run_id);
        tokens
    }

    async fn migrate_folders(
        &self,
        state: &mut RunState,
        report: &mut MigrationReport,
    ) -> MigrateResult<()> {
        let mut folders = self.options.folders.clone();
        folders.sort_by_key(|f| f.precedence);

        for folder in &folders {
            if folder.only_after_create && !state.fresh {
                log::debug!(
                    "Skipping folder '{}': database was not created by this run",
                    folder.role
                );
                continue;
            }

            let scripts = discover(&self.options.scripts_root, folder)?;
            if scripts.is_empty() {
                continue;
            }
            log::info!(
                "Folder '{}' ({}): {} script(s)",
                folder.role,
                folder.policy,
                scripts.len()
            );

            for unit in scripts.iter_from(state.sequence) {
                let unit = unit?;
                state.sequence += 1;
                self.process_script(unit, state, report).await?;
            }
        }
        Ok(())
    }

    async fn process_script(
        &self,
        unit: ScriptUnit,
        state: &mut RunState,
        report: &mut MigrationReport,
    ) -> MigrateResult<()> {
        let mut entry = ScriptReport {
            script_name: unit.name.to_string(),
            folder_role: unit.role.to_string(),
            policy: unit.policy,
            content_hash: unit.hash.clone(),
            action: ScriptAction::Skipped,
            duration_ms: 0,
            error: None,
        };

        let environment = self.options.environment.as_deref();
        if !unit.runs_in_environment(environment) {
            log::warn!(
                "Skipping '{}': environment script not for environment '{}'",
                unit.name,
                environment.unwrap_or("(none)")
            );
            entry.action = ScriptAction::SkippedEnvironment;
            report.record(entry);
            return Ok(());
        }

        let decision = decide(
            unit.policy,
            &unit.hash,
            state.history.history_for(&unit.name),
            self.options.rerun_changed_once,
        );

        let reason = match decision {
            Decision::Skip => {
                log::debug!("Skipping '{}': unchanged", unit.name);
                report.record(entry);
                return Ok(());
            }
            Decision::Violation { recorded_hash } => {
                let err = MigrateError::PolicyViolation {
                    script: unit.name.to_string(),
                    role: unit.role.to_string(),
                    recorded_hash,
                    current_hash: unit.hash.clone(),
                };
                log::error!("{}", err);
                entry.action = ScriptAction::PolicyViolation;
                entry.error = Some(err.to_string());
                report.record(entry);
                if self.options.dry_run {
                    state.violation.get_or_insert(err);
                    return Ok(());
                }
                return Err(err);
            }
            Decision::Run(reason) => reason,
        };

        if reason == RunReason::ChangedOnceOverride {
            log::warn!(
                "Re-running changed run-once script '{}' because the override is set",
                unit.name
            );
        }

        if self.options.dry_run {
            if let Err(e) = self.batches(&unit, &state.tokens) {
                entry.action = ScriptAction::Failed;
                entry.error = Some(e.to_string());
                report.record(entry);
                return Err(e);
            }
            log::info!("Would run '{}' ({})", unit.name, reason);
            entry.action = ScriptAction::WouldRun;
            report.record(entry);
            return Ok(());
        }

        if self.options.baseline {
            state
                .history
                .append(NewScriptRun::success(
                    unit.name.as_str(),
                    unit.role.as_str(),
                    &unit.hash,
                    &state.run_id,
                ))
                .await?;
            log::info!("Baselined '{}' without executing it", unit.name);
            entry.action = ScriptAction::Baselined;
            report.record(entry);
            return Ok(());
        }

        let start = Instant::now();
        let result = self.apply(&unit, state).await;
        entry.duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                log::info!(
                    "Executed '{}' ({}) [{}ms]",
                    unit.name,
                    reason,
                    entry.duration_ms
                );
                entry.action = ScriptAction::Executed;
                report.record(entry);
                Ok(())
            }
            Err(e) => {
                entry.action = ScriptAction::Failed;
                entry.error = Some(e.to_string());
                report.record(entry);
                Err(e)
            }
        }
    }

    /// Replace tokens and split the script into batches.
    fn batches(&self, unit: &ScriptUnit, tokens: &TokenMap) -> MigrateResult<Vec<Batch>> {
        let text = replace_tokens(&unit.text, tokens);
        split_batches(&text, self.provider.dialect()).map_err(|source| MigrateError::Split {
            script: unit.name.to_string(),
            role: unit.role.to_string(),
            source,
        })
    }

    /// Execute a script and record its success, in its own transaction
    /// unless the whole run shares one.
    async fn apply(&self, unit: &ScriptUnit, state: &mut RunState) -> MigrateResult<()> {
        match self.execute_script(unit, state).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail_script(unit, e, state).await),
        }
    }

    async fn execute_script(&self, unit: &ScriptUnit, state: &mut RunState) -> MigrateResult<()> {
        let per_script = self.options.transaction == TransactionMode::PerScript;
        let transaction = |source: DbError| MigrateError::Transaction {
            script: unit.name.to_string(),
            recorded: false,
            source,
        };

        let batches = self.batches(unit, &state.tokens)?;
        if per_script {
            self.provider.begin().await.map_err(transaction)?;
        }
        self.execute_batches(unit, &batches).await?;
        state
            .history
            .append(NewScriptRun::success(
                unit.name.as_str(),
                unit.role.as_str(),
                &unit.hash,
                &state.run_id,
            ))
            .await?;
        if per_script {
            self.provider.commit().await.map_err(transaction)?;
        }
        Ok(())
    }

    async fn execute_batches(&self, unit: &ScriptUnit, batches: &[Batch]) -> MigrateResult<()> {
        log::debug!("Script '{}': {} batch(es)", unit.name, batches.len());
        for (index, batch) in batches.iter().enumerate() {
            for _ in 0..batch.repeat {
                log::debug!(
                    "Executing batch {} of '{}' (line {})",
                    index + 1,
                    unit.name,
                    batch.line
                );
                self.provider
                    .execute_batch(&batch.sql)
                    .await
                    .map_err(|source| MigrateError::SqlExecution {
                        script: unit.name.to_string(),
                        role: unit.role.to_string(),
                        batch_index: index + 1,
                        recorded: false,
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Roll back, then record the failure outside any transaction.
    async fn fail_script(
        &self,
        unit: &ScriptUnit,
        error: MigrateError,
        state: &mut RunState,
    ) -> MigrateError {
        // Split errors happen before anything executes
        if matches!(error, MigrateError::Split { .. }) {
            return error;
        }

        if let Err(e) = self.provider.rollback().await {
            log::error!("Rollback after failure of '{}' failed: {}", unit.name, e);
        }

        let row = NewScriptRun::failure(
            unit.name.as_str(),
            unit.role.as_str(),
            &unit.hash,
            &state.run_id,
            failure_message(&error),
        );
        let recorded = match state.history.append(row).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("Could not record failure of '{}': {}", unit.name, e);
                false
            }
        };
        with_recorded(error, recorded)
    }
}

/// Message stored in the failure row.
fn failure_message(error: &MigrateError) -> String {
    match error {
        MigrateError::SqlExecution {
            batch_index,
            source,
            ..
        } => format!("batch {}: {}", batch_index, source),
        MigrateError::Transaction { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

fn with_recorded(error: MigrateError, recorded: bool) -> MigrateError {
    match error {
        MigrateError::SqlExecution {
            script,
            role,
            batch_index,
            source,
            ..
        } => MigrateError::SqlExecution {
            script,
            role,
            batch_index,
            recorded,
            source,
        },
        MigrateError::Transaction { script, source, .. } => MigrateError::Transaction {
            script,
            recorded,
            source,
        },
        other => other,
    }
}

#[cfg(test)]
#[path = "migrator_test.rs"]
mod tests;
