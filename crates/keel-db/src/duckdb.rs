//! DuckDB provider

use crate::error::{DbError, DbResult};
use crate::file_catalog::{database_path, find_database_file, new_database_file, IN_MEMORY};
use crate::history_table::{HistoryTable, RawRun};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use duckdb::{params, Connection};
use keel_core::history::format_timestamp;
use keel_core::{DatabaseConfig, DbType, NewScriptRun, ScriptRun};
use keel_sql::{DuckDbDialect, SqlDialect};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const EXTENSIONS: &[&str] = &["duckdb", "ddb", "db"];

/// DuckDB provider. Each database is a file in `directory`.
pub struct DuckDbProvider {
    directory: PathBuf,
    history: HistoryTable,
    conn: Mutex<Option<Connection>>,
    in_transaction: AtomicBool,
}

impl DuckDbProvider {
    pub fn new(directory: impl Into<PathBuf>, history: HistoryTable) -> Self {
        Self {
            directory: directory.into(),
            history,
            conn: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &DatabaseConfig, history: HistoryTable) -> Self {
        Self::new(&config.directory, history)
    }

    /// Open a connection (handles :memory: special case)
    fn connect(&self, physical: &str) -> DbResult<Connection> {
        if physical == IN_MEMORY {
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))
        } else {
            Connection::open(database_path(&self.directory, physical))
                .map_err(|e| DbError::ConnectionError(e.to_string()))
        }
    }

    fn table(&self) -> String {
        format!(
            "{}.{}",
            DuckDbDialect.quote_ident(&self.history.schema),
            DuckDbDialect.quote_ident(&self.history.table)
        )
    }

    fn sequence(&self) -> String {
        format!("{}.{}_id_seq", self.history.schema, self.history.table)
    }

    /// Run `f` against the open connection.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        f(conn)
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(DbError::from))
    }

    fn transaction_sql(&self, sql: &str, active_after: bool) -> DbResult<()> {
        self.execute_batch_sync(sql)
            .map_err(|e| e.into_transaction(sql))?;
        self.in_transaction.store(active_after, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProviderCore for DuckDbProvider {
    fn db_type(&self) -> DbType {
        DbType::DuckDb
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &DuckDbDialect
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let conn = self.connect(database)?;
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        *guard = Some(conn);
        self.in_transaction.store(false, Ordering::SeqCst);
        log::debug!("Opened DuckDB database {}", database);
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| DbError::from(e))?;
        }
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sql("BEGIN TRANSACTION", true)
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sql("COMMIT", false)
    }

    async fn rollback(&self) -> DbResult<()> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.transaction_sql("ROLLBACK", false)
    }
}

#[async_trait]
impl ProviderCatalog for DuckDbProvider {
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        find_database_file(&self.directory, name, EXTENSIONS, |s| self.fold_name(s))
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let physical = new_database_file(name, EXTENSIONS, "duckdb");
        if physical != IN_MEMORY {
            ensure_directory(&self.directory)?;
            // Opening a missing file creates it
            let conn = self.connect(&physical)?;
            conn.close().map_err(|(_, e)| DbError::from(e))?;
        }
        log::info!("Created DuckDB database {}", physical);
        Ok(physical)
    }
}

fn ensure_directory(dir: &Path) -> DbResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| DbError::ConnectionError(format!("cannot create {}: {}", dir.display(), e)))
}

#[async_trait]
impl ProviderHistory for DuckDbProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                params![self.history.schema, self.history.table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE SEQUENCE IF NOT EXISTS {sequence};
             CREATE TABLE IF NOT EXISTS {table} (
                 id BIGINT PRIMARY KEY DEFAULT nextval('{sequence}'),
                 script_name VARCHAR NOT NULL,
                 folder_role VARCHAR NOT NULL,
                 content_hash VARCHAR NOT NULL,
                 run_at TIMESTAMP NOT NULL,
                 outcome VARCHAR NOT NULL,
                 run_id VARCHAR NOT NULL,
                 error_message VARCHAR
             );",
            schema = DuckDbDialect.quote_ident(&self.history.schema),
            sequence = self.sequence(),
            table = self.table()
        );
        self.execute_batch_sync(&sql)
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, ?)
             RETURNING id",
            self.table()
        );
        self.with_conn(|conn| {
            let id: i64 = conn.query_row(
                &sql,
                params![
                    run.script_name,
                    run.folder_role,
                    run.content_hash,
                    format_timestamp(&run.run_at),
                    run.outcome.as_str(),
                    run.run_id,
                    run.error_message,
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT id, script_name, folder_role, content_hash, CAST(run_at AS VARCHAR),
                    outcome, run_id, error_message
             FROM {} ORDER BY run_at, id",
            self.table()
        );
        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(RawRun {
                    id: row.get(0)?,
                    script_name: row.get(1)?,
                    folder_role: row.get(2)?,
                    content_hash: row.get(3)?,
                    run_at: row.get(4)?,
                    outcome: row.get(5)?,
                    run_id: row.get(6)?,
                    error_message: row.get(7)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })?;
        raw.into_iter().map(RawRun::decode).collect()
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
