use super::*;
use keel_core::folder::default_folders;
use keel_core::{DatabaseConfig, DbType, HistoryConfig, RunOutcome};
use keel_db::create_provider;
use std::fs;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sqlite_migrator(dir: &TempDir, options: MigrateOptions) -> Migrator {
    let config = DatabaseConfig::file(
        DbType::Sqlite,
        dir.path().join("data").to_string_lossy(),
        options.database.clone(),
    );
    let provider = create_provider(&config, &HistoryConfig::default()).unwrap();
    Migrator::new(provider, options)
}

fn target(name: &str) -> DatabaseTarget {
    DatabaseTarget {
        name: name.to_string(),
        folded: name.to_lowercase(),
        physical: Some(format!("{}.db", name)),
        created: false,
    }
}

#[test]
fn test_options_defaults() {
    let options = MigrateOptions::new("app", "/tmp/db", default_folders());
    assert_eq!(options.transaction, TransactionMode::PerScript);
    assert!(options.create_database);
    assert!(!options.dry_run);
    assert!(!options.baseline);
    assert!(options.environment.is_none());
}

#[test]
fn test_options_from_config_applies_target() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "keel.yml",
        r#"
name: sample
scripts_dir: db
database:
  type: sqlite
  name: app
  directory: data
transaction: whole_run
tokens:
  Owner: dev_owner
  Schema: app
targets:
  prod:
    environment: PROD
    tokens:
      Owner: prod_owner
"#,
    );
    let config = Config::load_from_dir(dir.path()).unwrap();

    let options = MigrateOptions::from_config(&config, Some("prod"), dir.path()).unwrap();
    assert_eq!(options.database, "app");
    assert_eq!(options.scripts_root, dir.path().join("db"));
    assert_eq!(options.transaction, TransactionMode::WholeRun);
    assert_eq!(options.environment.as_deref(), Some("PROD"));
    assert_eq!(options.tokens["Owner"], "prod_owner");
    assert_eq!(options.tokens["Schema"], "app");

    let err = MigrateOptions::from_config(&config, Some("nope"), dir.path()).unwrap_err();
    assert!(matches!(err, MigrateError::Config(_)));
}

#[test]
fn test_builtin_tokens_override_user_tokens() {
    let dir = TempDir::new().unwrap();
    let mut options = MigrateOptions::new("App", dir.path(), default_folders());
    options.server_name = "localhost:5432".to_string();
    options.environment = Some("TEST".to_string());
    options
        .tokens
        .insert("DatabaseName".to_string(), "ignored".to_string());
    options
        .tokens
        .insert("Owner".to_string(), "app_owner".to_string());
    let migrator = sqlite_migrator(&dir, options);

    let tokens = migrator.token_map(&target("App"), "run-42");
    assert_eq!(tokens.get("DatabaseName"), Some("App"));
    assert_eq!(tokens.get("ServerName"), Some("localhost:5432"));
    assert_eq!(tokens.get("environment"), Some("TEST"));
    assert_eq!(tokens.get("RunId"), Some("run-42"));
    assert_eq!(tokens.get("Owner"), Some("app_owner"));
}

#[test]
fn test_failure_message_names_the_batch() {
    let err = MigrateError::SqlExecution {
        script: "up/1.sql".to_string(),
        role: "up".to_string(),
        batch_index: 3,
        recorded: false,
        source: DbError::ExecutionError("no such table: t".to_string()),
    };
    let message = failure_message(&err);
    assert!(message.starts_with("batch 3: "));
    assert!(message.contains("no such table: t"));
    assert!(!message.contains("M005"));
}

#[test]
fn test_with_recorded_marks_script_failures_only() {
    let err = MigrateError::Transaction {
        script: "up/1.sql".to_string(),
        recorded: false,
        source: DbError::NotConnected,
    };
    assert!(with_recorded(err, true).is_recorded());

    let err = with_recorded(MigrateError::History(DbError::NotConnected), true);
    assert!(!err.is_recorded());
}

#[tokio::test]
async fn test_run_creates_database_and_records_scripts() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "db/up/1_init.sql", "CREATE TABLE t (id INTEGER);");
    write(dir.path(), "db/permissions/grant.sql", "SELECT 1;");
    let options = MigrateOptions::new("app", dir.path().join("db"), default_folders());
    let migrator = sqlite_migrator(&dir, options);

    let outcome = migrator.run().await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    let report = outcome.report;
    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.database_created);
    assert_eq!(report.database, "app.db");
    assert_eq!(report.summary().executed, 2);

    let runs = migrator.history().await.unwrap().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.outcome == RunOutcome::Success));
    assert!(runs.iter().all(|r| r.run_id == report.run_id));
}

#[tokio::test]
async fn test_history_of_missing_database_is_none() {
    let dir = TempDir::new().unwrap();
    let options = MigrateOptions::new("absent", dir.path().join("db"), default_folders());
    let migrator = sqlite_migrator(&dir, options);

    assert!(migrator.history().await.unwrap().is_none());
    assert!(!dir.path().join("data").exists());
}

#[tokio::test]
async fn test_missing_database_without_create_fails() {
    let dir = TempDir::new().unwrap();
    let mut options = MigrateOptions::new("absent", dir.path().join("db"), default_folders());
    options.create_database = false;
    let migrator = sqlite_migrator(&dir, options);

    let outcome = migrator.run().await;
    assert_eq!(outcome.report.status, RunStatus::Aborted);
    match outcome.result {
        Err(MigrateError::Connection { database, source }) => {
            assert_eq!(database, "absent");
            assert!(matches!(source, DbError::DatabaseNotFound { .. }));
        }
        other => panic!("expected connection error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_split_error_is_not_recorded() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "db/up/1_bad.sql", "SELECT 'unterminated;");
    let options = MigrateOptions::new("app", dir.path().join("db"), default_folders());
    let migrator = sqlite_migrator(&dir, options);

    let outcome = migrator.run().await;
    assert!(matches!(outcome.result, Err(MigrateError::Split { .. })));
    assert_eq!(outcome.report.summary().failed, 1);
    assert!(migrator.history().await.unwrap().unwrap().is_empty());
}
