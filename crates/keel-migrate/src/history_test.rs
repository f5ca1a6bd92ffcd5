use super::*;
use keel_core::{DatabaseConfig, DbType, HistoryConfig, RunOutcome};
use keel_db::create_provider;
use tempfile::TempDir;

async fn in_memory_provider(dir: &TempDir) -> Arc<dyn Provider> {
    let config = DatabaseConfig::file(DbType::Sqlite, dir.path().to_string_lossy(), ":memory:");
    let provider = create_provider(&config, &HistoryConfig::default()).unwrap();
    provider.open(":memory:").await.unwrap();
    provider
}

#[tokio::test]
async fn test_append_updates_latest() {
    let dir = TempDir::new().unwrap();
    let provider = in_memory_provider(&dir).await;
    let mut store = HistoryStore::open(provider).await.unwrap();
    assert!(store.is_attached());
    assert!(store.history_for("up/1.sql").is_none());

    store
        .append(NewScriptRun::success("up/1.sql", "up", "h1", "run-1"))
        .await
        .unwrap();
    let second = store
        .append(NewScriptRun::failure("up/1.sql", "up", "h2", "run-2", "boom"))
        .await
        .unwrap();

    let history = store.history_for("UP/1.SQL").unwrap();
    assert_eq!(history.latest.id, second.id);
    assert_eq!(history.latest.outcome, RunOutcome::Failure);
    assert_eq!(history.applied_hash(), Some("h1"));
    assert_eq!(store.all_runs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reopen_reads_persisted_rows() {
    let dir = TempDir::new().unwrap();
    let provider = in_memory_provider(&dir).await;
    let mut store = HistoryStore::open(provider.clone()).await.unwrap();
    store
        .append(NewScriptRun::success("views/v.sql", "views", "h1", "run-1"))
        .await
        .unwrap();

    let reopened = HistoryStore::open_read_only(provider).await.unwrap();
    assert_eq!(
        reopened.history_for("views/v.sql").unwrap().latest.content_hash,
        "h1"
    );
}

#[tokio::test]
async fn test_read_only_without_table_is_detached() {
    let dir = TempDir::new().unwrap();
    let provider = in_memory_provider(&dir).await;
    let mut store = HistoryStore::open_read_only(provider.clone()).await.unwrap();
    assert!(!store.is_attached());
    assert!(store.all_runs().await.unwrap().is_empty());
    assert!(store
        .append(NewScriptRun::success("up/1.sql", "up", "h", "run-1"))
        .await
        .is_err());
    assert!(!provider.history_exists().await.unwrap());
}
