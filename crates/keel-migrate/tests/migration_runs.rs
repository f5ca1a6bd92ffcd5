//! Integration tests: full migration runs against the file-based engines
//!
//! Every scenario runs once per engine through the `engine_tests!` macro.

use keel_core::folder::default_folders;
use keel_core::{
    DatabaseConfig, DbType, HistoryConfig, RunOutcome, RunStatus, ScriptAction, ScriptRun,
    TransactionMode,
};
use keel_db::{create_provider, ProviderCatalog, ProviderCore};
use keel_migrate::{MigrateError, MigrateOptions, MigrationOutcome, Migrator};
use std::fs;
use tempfile::TempDir;

/// A scratch project: scripts under `db/`, database files under `data/`.
struct Project {
    dir: TempDir,
    db_type: DbType,
}

impl Project {
    fn new(db_type: DbType) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            db_type,
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join("db").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn data_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    fn database_config(&self, name: &str) -> DatabaseConfig {
        DatabaseConfig::file(self.db_type, self.data_dir().to_string_lossy(), name)
    }

    fn options(&self, name: &str) -> MigrateOptions {
        MigrateOptions::new(name, self.dir.path().join("db"), default_folders())
    }

    fn migrator(&self, options: MigrateOptions) -> Migrator {
        let config = self.database_config(&options.database);
        let provider = create_provider(&config, &HistoryConfig::default()).unwrap();
        Migrator::new(provider, options)
    }

    async fn migrate_with(&self, options: MigrateOptions) -> MigrationOutcome {
        self.migrator(options).run().await
    }

    async fn migrate(&self, name: &str) -> MigrationOutcome {
        self.migrate_with(self.options(name)).await
    }

    async fn history(&self, name: &str) -> Vec<ScriptRun> {
        self.migrator(self.options(name))
            .history()
            .await
            .unwrap()
            .unwrap_or_default()
    }

    async fn has_table(&self, database: &str, table: &str) -> bool {
        let config = self.database_config(database);
        let provider = create_provider(&config, &HistoryConfig::default()).unwrap();
        let physical = provider.find_database(database).await.unwrap().unwrap();
        provider.open(&physical).await.unwrap();
        let found = provider
            .execute_batch(&format!("SELECT COUNT(*) FROM {}", table))
            .await
            .is_ok();
        provider.close().await.unwrap();
        found
    }

    /// Database files in the data directory, ignoring journals.
    fn database_files(&self) -> usize {
        match fs::read_dir(self.data_dir()) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| e.file_name().to_str().map(String::from))
                .filter(|name| !name.ends_with(".wal") && !name.ends_with("-journal"))
                .count(),
            Err(_) => 0,
        }
    }
}

fn executed(outcome: &MigrationOutcome) -> Vec<String> {
    outcome
        .report
        .scripts_with(ScriptAction::Executed)
        .map(|s| s.script_name.clone())
        .collect()
}

async fn second_run_only_executes_run_always_scripts(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");
    project.write("views/v_widgets.sql", "CREATE VIEW v_widgets AS SELECT id FROM widgets;");
    project.write("permissions/grants.sql", "SELECT 1;");

    let first = project.migrate("app").await;
    assert!(first.is_success(), "{:?}", first.result);
    assert_eq!(first.report.summary().executed, 3);

    let second = project.migrate("app").await;
    assert!(second.is_success(), "{:?}", second.result);
    assert_eq!(executed(&second), vec!["permissions/grants.sql"]);
    assert_eq!(second.report.summary().skipped, 2);
    assert!(!second.report.database_created);

    let history = project.history("app").await;
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(ScriptRun::is_success));
}

async fn database_names_match_ignoring_case(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");

    let first = project.migrate("CASEDATABASE").await;
    assert!(first.is_success(), "{:?}", first.result);
    assert!(first.report.database_created);

    let second = project.migrate("casedatabase").await;
    assert!(second.is_success(), "{:?}", second.result);
    assert!(!second.report.database_created);
    assert_eq!(second.report.database, first.report.database);
    assert!(second.report.database.starts_with("CASEDATABASE."));
    assert_eq!(second.report.summary().executed, 0);
    assert_eq!(project.database_files(), 1);
}

async fn scripts_run_in_folder_then_natural_order(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/10_c.sql", "CREATE TABLE c (id INTEGER);");
    project.write("up/2_b.sql", "CREATE TABLE b (id INTEGER);");
    project.write("up/1_a.sql", "CREATE TABLE a (id INTEGER);");
    project.write("views/v_a.sql", "CREATE VIEW v_a AS SELECT id FROM a;");
    project.write("runBeforeUp/setup.sql", "SELECT 1;");

    let outcome = project.migrate("app").await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(
        executed(&outcome),
        vec![
            "runBeforeUp/setup.sql",
            "up/1_a.sql",
            "up/2_b.sql",
            "up/10_c.sql",
            "views/v_a.sql",
        ]
    );
}

async fn changed_run_on_change_script_reruns(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER, name TEXT);");
    project.write("views/v_widgets.sql", "CREATE VIEW v_widgets AS SELECT id FROM widgets;");
    assert!(project.migrate("app").await.is_success());

    project.write(
        "views/v_widgets.sql",
        "DROP VIEW IF EXISTS v_widgets;\nCREATE VIEW v_widgets AS SELECT id, name FROM widgets;",
    );
    let outcome = project.migrate("app").await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(executed(&outcome), vec!["views/v_widgets.sql"]);

    let view_rows: Vec<_> = project
        .history("app")
        .await
        .into_iter()
        .filter(|r| r.script_name == "views/v_widgets.sql")
        .collect();
    assert_eq!(view_rows.len(), 2);
    assert_ne!(view_rows[0].content_hash, view_rows[1].content_hash);
}

async fn changed_run_once_script_is_a_violation(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");
    project.write("up/2_more.sql", "CREATE TABLE gadgets (id INTEGER);");
    assert!(project.migrate("app").await.is_success());

    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER, extra INTEGER);");
    project.write("up/3_late.sql", "CREATE TABLE late (id INTEGER);");
    let outcome = project.migrate("app").await;
    match &outcome.result {
        Err(MigrateError::PolicyViolation {
            script,
            recorded_hash,
            current_hash,
            ..
        }) => {
            assert_eq!(script, "up/1_init.sql");
            assert_ne!(recorded_hash, current_hash);
        }
        other => panic!("expected policy violation, got {:?}", other),
    }
    assert_eq!(outcome.report.status, RunStatus::Aborted);
    assert_eq!(project.history("app").await.len(), 2);
    assert!(!project.has_table("app", "late").await);

    let mut options = project.options("app");
    options.rerun_changed_once = true;
    project.write("up/1_init.sql", "ALTER TABLE widgets ADD COLUMN extra INTEGER;");
    let outcome = project.migrate_with(options).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(executed(&outcome), vec!["up/1_init.sql", "up/3_late.sql"]);
}

async fn failed_override_does_not_lift_run_once_check(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE t (id INTEGER);");
    assert!(project.migrate("app").await.is_success());

    let mut options = project.options("app");
    options.rerun_changed_once = true;
    project.write("up/1_init.sql", "INSERT INTO missing_table VALUES (1);");
    let failed = project.migrate_with(options).await;
    assert!(failed.result.as_ref().unwrap_err().is_script_failure());

    project.write("up/1_init.sql", "CREATE TABLE t2 (id INTEGER);");
    let outcome = project.migrate("app").await;
    assert!(
        outcome.result.as_ref().unwrap_err().is_policy_violation(),
        "{:?}",
        outcome.result
    );
    assert!(executed(&outcome).is_empty());
    assert!(!project.has_table("app", "t2").await);
}

async fn revert_to_applied_content_is_skipped(db_type: DbType) {
    let project = Project::new(db_type);
    let applied = "CREATE TABLE t (id INTEGER);";
    project.write("up/1_init.sql", applied);
    assert!(project.migrate("app").await.is_success());

    let mut options = project.options("app");
    options.rerun_changed_once = true;
    project.write("up/1_init.sql", "INSERT INTO missing_table VALUES (1);");
    assert!(!project.migrate_with(options).await.is_success());

    project.write("up/1_init.sql", applied);
    let outcome = project.migrate("app").await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert!(executed(&outcome).is_empty());
    assert_eq!(outcome.report.summary().skipped, 1);
    assert_eq!(project.history("app").await.len(), 2);
}

async fn non_utf8_change_is_detected(db_type: DbType) {
    let project = Project::new(db_type);
    let path = project.dir.path().join("db/views/v.sql");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"SELECT '\xE9' AS letter;").unwrap();
    let first = project.migrate("app").await;
    assert!(first.is_success(), "{:?}", first.result);

    fs::write(&path, b"SELECT '\xE8' AS letter;").unwrap();
    let second = project.migrate("app").await;
    assert!(second.is_success(), "{:?}", second.result);
    assert_eq!(executed(&second), vec!["views/v.sql"]);
}

async fn long_leading_comment_is_executed(db_type: DbType) {
    let project = Project::new(db_type);
    let comment = format!("/* {} */\n", "x".repeat(8192));
    project.write(
        "up/1_commented.sql",
        &format!("{}CREATE TABLE commented (id INTEGER);\n-- trailing note", comment),
    );

    let outcome = project.migrate("app").await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert!(project.has_table("app", "commented").await);
}

async fn failed_batch_is_recorded_and_retried(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_ok.sql", "CREATE TABLE ok_table (id INTEGER);");
    project.write(
        "up/2_broken.sql",
        "CREATE TABLE partial (id INTEGER);\nGO\nINSERT INTO missing_table VALUES (1);\nGO\n",
    );
    project.write("up/3_never.sql", "CREATE TABLE never (id INTEGER);");

    let outcome = project.migrate("app").await;
    match &outcome.result {
        Err(MigrateError::SqlExecution {
            script,
            batch_index,
            recorded,
            ..
        }) => {
            assert_eq!(script, "up/2_broken.sql");
            assert_eq!(*batch_index, 2);
            assert!(*recorded);
        }
        other => panic!("expected execution failure, got {:?}", other),
    }
    assert_eq!(outcome.report.summary().failed, 1);
    assert!(project.has_table("app", "ok_table").await);
    assert!(!project.has_table("app", "partial").await);
    assert!(!project.has_table("app", "never").await);

    let history = project.history("app").await;
    assert_eq!(history.len(), 2);
    let failure = &history[1];
    assert_eq!(failure.script_name, "up/2_broken.sql");
    assert_eq!(failure.outcome, RunOutcome::Failure);
    assert!(failure
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("batch 2: "));

    project.write(
        "up/2_broken.sql",
        "CREATE TABLE partial (id INTEGER);\nGO\nINSERT INTO partial VALUES (1);\nGO\n",
    );
    let retry = project.migrate("app").await;
    assert!(retry.is_success(), "{:?}", retry.result);
    assert_eq!(executed(&retry), vec!["up/2_broken.sql", "up/3_never.sql"]);
}

async fn whole_run_transaction_rolls_back_everything(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_ok.sql", "CREATE TABLE ok_table (id INTEGER);");
    project.write("up/2_broken.sql", "INSERT INTO missing_table VALUES (1);");

    let mut options = project.options("app");
    options.transaction = TransactionMode::WholeRun;
    let outcome = project.migrate_with(options).await;
    assert!(outcome.result.as_ref().unwrap_err().is_script_failure());
    assert!(!project.has_table("app", "ok_table").await);

    let summary = outcome.report.summary();
    assert_eq!(summary.executed, 0);
    assert_eq!(summary.rolled_back, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        outcome
            .report
            .scripts_with(ScriptAction::RolledBack)
            .map(|s| s.script_name.as_str())
            .collect::<Vec<_>>(),
        vec!["up/1_ok.sql"]
    );

    let history = project.history("app").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].script_name, "up/2_broken.sql");
    assert_eq!(history[0].outcome, RunOutcome::Failure);
}

async fn dry_run_changes_nothing(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");

    let mut options = project.options("app");
    options.dry_run = true;
    let outcome = project.migrate_with(options.clone()).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(outcome.report.summary().would_run, 1);
    assert!(!outcome.report.database_created);
    assert_eq!(project.database_files(), 0);

    assert!(project.migrate("app").await.is_success());
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER, x INTEGER);");
    project.write("up/2_next.sql", "CREATE TABLE next_table (id INTEGER);");

    let outcome = project.migrate_with(options).await;
    assert!(outcome.result.as_ref().unwrap_err().is_policy_violation());
    assert_eq!(outcome.report.summary().policy_violations, 1);
    assert_eq!(outcome.report.summary().would_run, 1);
    assert_eq!(project.history("app").await.len(), 1);
    assert!(!project.has_table("app", "next_table").await);
}

async fn baseline_records_without_executing(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");

    let mut options = project.options("app");
    options.baseline = true;
    let outcome = project.migrate_with(options).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(outcome.report.summary().baselined, 1);
    assert!(!project.has_table("app", "widgets").await);

    let next = project.migrate("app").await;
    assert!(next.is_success(), "{:?}", next.result);
    assert_eq!(next.report.summary().executed, 0);
    assert_eq!(project.history("app").await.len(), 1);
}

async fn environment_scripts_follow_environment(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("up/1_test.TEST.env.sql", "CREATE TABLE test_only (id INTEGER);");
    project.write("up/2_prod.PROD.env.sql", "CREATE TABLE prod_only (id INTEGER);");
    project.write("up/3_all.sql", "CREATE TABLE everywhere (id INTEGER);");

    let mut options = project.options("app");
    options.environment = Some("test".to_string());
    let outcome = project.migrate_with(options).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(
        executed(&outcome),
        vec!["up/1_test.TEST.env.sql", "up/3_all.sql"]
    );
    assert_eq!(
        outcome
            .report
            .scripts_with(ScriptAction::SkippedEnvironment)
            .count(),
        1
    );
    assert!(!project.has_table("app", "prod_only").await);
}

async fn tokens_are_replaced(db_type: DbType) {
    let project = Project::new(db_type);
    project.write(
        "up/1_tokens.sql",
        "CREATE TABLE {{Prefix}}_items (name TEXT);\n\
         INSERT INTO {{prefix}}_items VALUES ('{{DatabaseName}}');",
    );

    let mut options = project.options("app");
    options
        .tokens
        .insert("Prefix".to_string(), "shop".to_string());
    let outcome = project.migrate_with(options).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert!(project.has_table("app", "shop_items").await);
}

async fn after_create_folder_runs_only_on_creation(db_type: DbType) {
    let project = Project::new(db_type);
    project.write("runAfterCreateDatabase/seed.sql", "CREATE TABLE seeded (id INTEGER);");
    project.write("up/1_init.sql", "CREATE TABLE widgets (id INTEGER);");

    let first = project.migrate("app").await;
    assert!(first.is_success(), "{:?}", first.result);
    assert_eq!(
        executed(&first),
        vec!["runAfterCreateDatabase/seed.sql", "up/1_init.sql"]
    );

    project.write(
        "runAfterCreateDatabase/seed.sql",
        "CREATE TABLE seeded_again (id INTEGER);",
    );
    let second = project.migrate("app").await;
    assert!(second.is_success(), "{:?}", second.result);
    assert!(executed(&second).is_empty());
    assert!(!project.has_table("app", "seeded_again").await);
}

macro_rules! engine_tests {
    ($module:ident, $db_type:expr) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn test_second_run_only_executes_run_always_scripts() {
                second_run_only_executes_run_always_scripts($db_type).await;
            }

            #[tokio::test]
            async fn test_database_names_match_ignoring_case() {
                database_names_match_ignoring_case($db_type).await;
            }

            #[tokio::test]
            async fn test_scripts_run_in_folder_then_natural_order() {
                scripts_run_in_folder_then_natural_order($db_type).await;
            }

            #[tokio::test]
            async fn test_changed_run_on_change_script_reruns() {
                changed_run_on_change_script_reruns($db_type).await;
            }

            #[tokio::test]
            async fn test_changed_run_once_script_is_a_violation() {
                changed_run_once_script_is_a_violation($db_type).await;
            }

            #[tokio::test]
            async fn test_failed_override_does_not_lift_run_once_check() {
                failed_override_does_not_lift_run_once_check($db_type).await;
            }

            #[tokio::test]
            async fn test_revert_to_applied_content_is_skipped() {
                revert_to_applied_content_is_skipped($db_type).await;
            }

            #[tokio::test]
            async fn test_non_utf8_change_is_detected() {
                non_utf8_change_is_detected($db_type).await;
            }

            #[tokio::test]
            async fn test_long_leading_comment_is_executed() {
                long_leading_comment_is_executed($db_type).await;
            }

            #[tokio::test]
            async fn test_failed_batch_is_recorded_and_retried() {
                failed_batch_is_recorded_and_retried($db_type).await;
            }

            #[tokio::test]
            async fn test_whole_run_transaction_rolls_back_everything() {
                whole_run_transaction_rolls_back_everything($db_type).await;
            }

            #[tokio::test]
            async fn test_dry_run_changes_nothing() {
                dry_run_changes_nothing($db_type).await;
            }

            #[tokio::test]
            async fn test_baseline_records_without_executing() {
                baseline_records_without_executing($db_type).await;
            }

            #[tokio::test]
            async fn test_environment_scripts_follow_environment() {
                environment_scripts_follow_environment($db_type).await;
            }

            #[tokio::test]
            async fn test_tokens_are_replaced() {
                tokens_are_replaced($db_type).await;
            }

            #[tokio::test]
            async fn test_after_create_folder_runs_only_on_creation() {
                after_create_folder_runs_only_on_creation($db_type).await;
            }
        }
    };
}

engine_tests!(sqlite, DbType::Sqlite);
engine_tests!(duckdb, DbType::DuckDb);
