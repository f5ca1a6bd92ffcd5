//! SQLite provider

use crate::error::{DbError, DbResult};
use crate::file_catalog::{database_path, find_database_file, new_database_file, IN_MEMORY};
use crate::history_table::{HistoryTable, RawRun, SELECT_COLUMNS};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use keel_core::history::format_timestamp;
use keel_core::{DatabaseConfig, DbType, NewScriptRun, ScriptRun};
use keel_sql::{SqlDialect, SqliteDialect};
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{params, Batch, Connection};
use std::path::PathBuf;
use std::sync::Mutex;

const EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// SQLite provider. Each database is a file in `directory`.
pub struct SqliteProvider {
    directory: PathBuf,
    history: HistoryTable,
    conn: Mutex<Option<Connection>>,
}

impl SqliteProvider {
    pub fn new(directory: impl Into<PathBuf>, history: HistoryTable) -> Self {
        Self {
            directory: directory.into(),
            history,
            conn: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DatabaseConfig, history: HistoryTable) -> Self {
        Self::new(&config.directory, history)
    }

    fn table(&self) -> String {
        SqliteDialect.quote_ident(&self.history.flat_name())
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

    fn transaction_sql(&self, sql: &str) -> DbResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(DbError::from))
            .map_err(|e| e.into_transaction(sql))
    }
}

/// Run every statement in `sql`, draining any rows. Unlike
/// `Connection::execute_batch` this accepts statements that return rows.
fn run_statements(conn: &Connection, sql: &str) -> DbResult<()> {
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
    }
    Ok(())
}

#[async_trait]
impl ProviderCore for SqliteProvider {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &SqliteDialect
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let conn = if database == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(database_path(&self.directory, database))?
        };
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        *guard = Some(conn);
        log::debug!("Opened SQLite database {}", database);
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
        self.with_conn(|conn| run_statements(conn, sql))
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sql("BEGIN")
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sql("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        // A failed statement may already have ended the transaction
        let active = self.with_conn(|conn| Ok(!conn.is_autocommit()))?;
        if active {
            self.transaction_sql("ROLLBACK")?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderCatalog for SqliteProvider {
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        find_database_file(&self.directory, name, EXTENSIONS, |s| self.fold_name(s))
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let physical = new_database_file(name, EXTENSIONS, "db");
        if physical != IN_MEMORY {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                DbError::ConnectionError(format!(
                    "cannot create {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;
            let path = database_path(&self.directory, &physical);
            // An empty file is a valid empty SQLite database
            std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| {
                    DbError::ConnectionError(format!("cannot create {}: {}", path.display(), e))
                })?;
        }
        log::info!("Created SQLite database {}", physical);
        Ok(physical)
    }
}

#[async_trait]
impl ProviderHistory for SqliteProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        let name = self.history.flat_name();
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                script_name TEXT NOT NULL,
                folder_role TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                run_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                run_id TEXT NOT NULL,
                error_message TEXT
            )",
            self.table()
        );
        self.with_conn(|conn| conn.execute_batch(&sql).map_err(DbError::from))
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            self.table()
        );
        self.with_conn(|conn| {
            conn.execute(
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
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY run_at, id",
            SELECT_COLUMNS,
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
#[path = "sqlite_test.rs"]
mod tests;
