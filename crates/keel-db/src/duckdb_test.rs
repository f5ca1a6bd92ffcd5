use super::*;
use keel_core::RunOutcome;
use tempfile::TempDir;

#[tokio::test]
async fn test_in_memory() {
    let dir = TempDir::new().unwrap();
    let db = DuckDbProvider::new(dir.path(), HistoryTable::default());
    assert_eq!(db.db_type(), DbType::DuckDb);
    db.open(IN_MEMORY).await.unwrap();
    db.execute_batch("CREATE TABLE t (id INT); INSERT INTO t VALUES (1);")
        .await
        .unwrap();
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_create_then_find_folded() {
    let dir = TempDir::new().unwrap();
    let db = DuckDbProvider::new(dir.path(), HistoryTable::default());

    let physical = db.create_database("CASEDATABASE").await.unwrap();
    assert_eq!(physical, "CASEDATABASE.duckdb");
    assert!(dir.path().join("CASEDATABASE.duckdb").is_file());

    assert_eq!(
        db.find_database("casedatabase").await.unwrap().as_deref(),
        Some("CASEDATABASE.duckdb")
    );
    let (_, created) = db.ensure_database("CaseDatabase", true).await.unwrap();
    assert!(!created);
}

#[tokio::test]
async fn test_history_in_schema() {
    let dir = TempDir::new().unwrap();
    let db = DuckDbProvider::new(dir.path(), HistoryTable::default());
    let physical = db.create_database("app").await.unwrap();
    db.open(&physical).await.unwrap();

    assert!(!db.history_exists().await.unwrap());
    db.ensure_history_table().await.unwrap();
    db.ensure_history_table().await.unwrap();
    assert!(db.history_exists().await.unwrap());

    let run = NewScriptRun::success("up/0001_init.sql", "up", "abc", "run-1");
    let first = db.append_run(&run).await.unwrap();
    let second = db
        .append_run(&NewScriptRun::failure(
            "up/0002_next.sql",
            "up",
            "def",
            "run-1",
            "syntax error",
        ))
        .await
        .unwrap();
    assert_ne!(first, second);

    let runs = db.all_runs().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].script_name, "up/0001_init.sql");
    assert_eq!(runs[0].run_at, run.run_at);
    assert_eq!(runs[1].outcome, RunOutcome::Failure);

    db.execute_batch("SELECT COUNT(*) FROM keel.script_run")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rollback_discards_work() {
    let dir = TempDir::new().unwrap();
    let db = DuckDbProvider::new(dir.path(), HistoryTable::default());
    db.open(IN_MEMORY).await.unwrap();
    db.execute_batch("CREATE TABLE t (id INT)").await.unwrap();

    db.begin().await.unwrap();
    db.execute_batch("INSERT INTO t VALUES (1)").await.unwrap();
    db.rollback().await.unwrap();

    let count = db
        .with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get::<_, i64>(0))
                .map_err(DbError::from)
        })
        .unwrap();
    assert_eq!(count, 0);

    // Nothing active
    db.rollback().await.unwrap();
}

#[tokio::test]
async fn test_failed_statement_then_rollback() {
    let dir = TempDir::new().unwrap();
    let db = DuckDbProvider::new(dir.path(), HistoryTable::default());
    db.open(IN_MEMORY).await.unwrap();

    db.begin().await.unwrap();
    let err = db.execute_batch("SELECT * FROM missing_table").await.unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(_)));
    db.rollback().await.unwrap();

    db.execute_batch("SELECT 1").await.unwrap();
}
