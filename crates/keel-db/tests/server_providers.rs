//! Provider tests against live servers.
//!
//! Each test runs only when its environment variable holds a connection
//! string for a server where the login may create databases:
//! - `KEEL_TEST_POSTGRES`: `host=localhost user=postgres password=...`
//! - `KEEL_TEST_MYSQL`: `mysql://root:pw@localhost:3306`
//! - `KEEL_TEST_SQLSERVER`: `server=tcp:localhost,1433;user=sa;password=...;TrustServerCertificate=true`

use keel_core::{DatabaseConfig, DbType, HistoryConfig, NewScriptRun, RunOutcome};
use keel_db::{create_provider, Provider, ProviderCatalog, ProviderCore, ProviderHistory};
use std::sync::Arc;

fn server_provider(var: &str, db_type: DbType) -> Option<Arc<dyn Provider>> {
    let conn_str = match std::env::var(var) {
        Ok(s) if !s.is_empty() => s,
        _ => {
            eprintln!("{} not set, skipping", var);
            return None;
        }
    };
    let mut config = DatabaseConfig::file(db_type, ".", "unused");
    config.connection_string = Some(conn_str);
    Some(create_provider(&config, &HistoryConfig::default()).unwrap())
}

fn unique_name(prefix: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        chrono::Utc::now().format("%Y%m%d%H%M%S%6f")
    )
}

/// `same_database` maps the created name to another spelling the engine
/// resolves to the same database.
async fn exercise(provider: Arc<dyn Provider>, same_database: fn(&str) -> String) {
    let logical = unique_name("KEEL_IT");

    let (physical, created) = provider.ensure_database(&logical, true).await.unwrap();
    assert!(created);

    let (again, created) = provider
        .ensure_database(&same_database(&logical), true)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again, physical);

    provider.open(&physical).await.unwrap();
    assert!(!provider.history_exists().await.unwrap());
    provider.ensure_history_table().await.unwrap();
    provider.ensure_history_table().await.unwrap();
    assert!(provider.history_exists().await.unwrap());

    provider
        .execute_batch("CREATE TABLE widgets (id INT)")
        .await
        .unwrap();

    provider.begin().await.unwrap();
    provider
        .execute_batch("INSERT INTO widgets VALUES (1)")
        .await
        .unwrap();
    let committed = NewScriptRun::success("up/0001_widgets.sql", "up", "h1", "run-1");
    let first = provider.append_run(&committed).await.unwrap();
    provider.commit().await.unwrap();

    provider.begin().await.unwrap();
    assert!(provider
        .execute_batch("INSERT INTO no_such_table VALUES (1)")
        .await
        .is_err());
    provider.rollback().await.unwrap();
    let failed = NewScriptRun::failure("up/0002_bad.sql", "up", "h2", "run-1", "missing table");
    let second = provider.append_run(&failed).await.unwrap();
    assert_ne!(first, second);

    let runs = provider.all_runs().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_at, committed.run_at);
    assert_eq!(runs[1].outcome, RunOutcome::Failure);

    let histories = provider.script_histories().await.unwrap();
    assert_eq!(histories.len(), 2);

    provider.close().await.unwrap();
}

#[tokio::test]
async fn test_postgres_provider() {
    if let Some(provider) = server_provider("KEEL_TEST_POSTGRES", DbType::Postgres) {
        // Unquoted identifiers fold to lower case
        exercise(provider, str::to_uppercase).await;
    }
}

#[tokio::test]
async fn test_mysql_provider() {
    if let Some(provider) = server_provider("KEEL_TEST_MYSQL", DbType::MySql) {
        // Case-sensitive under the default lower_case_table_names=0
        exercise(provider, str::to_string).await;
    }
}

#[tokio::test]
async fn test_sqlserver_provider() {
    if let Some(provider) = server_provider("KEEL_TEST_SQLSERVER", DbType::SqlServer) {
        // Default server collation is case-insensitive
        exercise(provider, str::to_lowercase).await;
    }
}
