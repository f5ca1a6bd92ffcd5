//! Oracle provider
//!
//! Oracle has no separate databases inside an instance, so a target
//! "database" is a schema (user). Names fold to upper case. The driver is
//! synchronous and runs with auto-commit off; statements outside an explicit
//! transaction are committed immediately.

use crate::error::{DbError, DbResult};
use crate::history_table::{HistoryTable, SELECT_COLUMNS};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use keel_core::{DatabaseConfig, DbType, NewScriptRun, RunOutcome, ScriptRun};
use keel_sql::{OracleDialect, SqlDialect};
use oracle::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const DEFAULT_SERVICE: &str = "XE";

/// Oracle provider.
pub struct OracleProvider {
    config: DatabaseConfig,
    history: HistoryTable,
    conn: Mutex<Option<Connection>>,
    in_transaction: AtomicBool,
}

impl OracleProvider {
    pub fn new(config: DatabaseConfig, history: HistoryTable) -> Self {
        Self {
            config,
            history,
            conn: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Easy Connect string; `admin_database` names the service.
    fn connect_string(&self) -> String {
        match &self.config.connection_string {
            Some(s) => s.clone(),
            None => format!(
                "//{}:{}/{}",
                self.config.host_or_default(),
                self.config.port_or_default(),
                self.config.admin_database.as_deref().unwrap_or(DEFAULT_SERVICE)
            ),
        }
    }

    fn connect(&self) -> DbResult<Connection> {
        let user = self.config.username.as_deref().unwrap_or("system");
        let password = self.config.resolved_password()?.unwrap_or_default();
        Connection::connect(user, password, self.connect_string())
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    fn table(&self) -> String {
        self.fold_name(&self.history.flat_name())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        let conn = guard.as_ref().ok_or(DbError::NotConnected)?;
        f(conn)
    }

    /// Commit unless an explicit transaction is active.
    fn autocommit(&self, conn: &Connection) -> DbResult<()> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            conn.commit()?;
        }
        Ok(())
    }
}

/// Whether a batch is a PL/SQL block, whose trailing `;` is part of the code.
pub(crate) fn is_plsql(sql: &str) -> bool {
    let words: Vec<String> = sql
        .split_whitespace()
        .take(5)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["BEGIN", ..] | ["DECLARE", ..] => true,
        ["CREATE", "OR", "REPLACE", kind, ..] | ["CREATE", kind, ..] => matches!(
            *kind,
            "PROCEDURE" | "FUNCTION" | "PACKAGE" | "TRIGGER" | "TYPE" | "EDITIONABLE"
        ),
        _ => false,
    }
}

/// Split a non PL/SQL batch into single statements at top-level `;`.
pub(crate) fn split_statements(sql: &str) -> Vec<String> {
    if is_plsql(sql.trim_start()) {
        return vec![sql.trim().to_string()];
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            current.push('\n');
                            break;
                        }
                    }
                }
                ';' => {
                    statements.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    statements.push(current);
    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl ProviderCore for OracleProvider {
    fn db_type(&self) -> DbType {
        DbType::Oracle
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &OracleDialect
    }

    fn fold_name(&self, name: &str) -> String {
        name.to_uppercase()
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "ALTER SESSION SET CURRENT_SCHEMA = {}",
                OracleDialect.quote_ident(database)
            ),
            &[],
        )?;
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        *guard = Some(conn);
        self.in_transaction.store(false, Ordering::SeqCst);
        log::debug!(
            "Opened Oracle schema {} on {}",
            database,
            self.config.server_label()
        );
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close()?;
        }
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            for statement in split_statements(sql) {
                conn.execute(&statement, &[])?;
            }
            self.autocommit(conn)
        })
    }

    async fn begin(&self) -> DbResult<()> {
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.commit()
                .map_err(|e| DbError::TransactionError(format!("COMMIT: {}", e)))
        })?;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.rollback()
                .map_err(|e| DbError::TransactionError(format!("ROLLBACK: {}", e)))
        })?;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProviderCatalog for OracleProvider {
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        let admin = self.connect()?;
        let rows = admin.query_as::<String>("SELECT username FROM all_users ORDER BY username", &[])?;
        let wanted = self.fold_name(name);
        let mut found = None;
        for username in rows {
            let username = username?;
            if self.fold_name(&username) == wanted {
                found = Some(username);
                break;
            }
        }
        admin.close()?;
        Ok(found)
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let physical = self.fold_name(name);
        let ident = OracleDialect.quote_ident(&physical);
        let password = self
            .config
            .resolved_password()?
            .unwrap_or_else(|| physical.clone());
        let admin = self.connect()?;
        admin.execute(
            &format!(
                "CREATE USER {} IDENTIFIED BY {} QUOTA UNLIMITED ON USERS",
                ident,
                OracleDialect.quote_ident(&password)
            ),
            &[],
        )?;
        admin.execute(
            &format!(
                "GRANT CREATE SESSION, CREATE TABLE, CREATE VIEW, CREATE SEQUENCE, \
                 CREATE PROCEDURE, CREATE TRIGGER, CREATE TYPE TO {}",
                ident
            ),
            &[],
        )?;
        admin.close()?;
        log::info!("Created Oracle schema {}", physical);
        Ok(physical)
    }
}

#[async_trait]
impl ProviderHistory for OracleProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        let table = self.table();
        self.with_conn(|conn| {
            let count = conn.query_row_as::<i64>(
                "SELECT COUNT(*) FROM all_tables
                 WHERE owner = SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA') AND table_name = :1",
                &[&table],
            )?;
            Ok(count > 0)
        })
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        if self.history_exists().await? {
            return Ok(());
        }
        let sql = format!(
            "CREATE TABLE {} (
                 id NUMBER(19) GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                 script_name VARCHAR2(512) NOT NULL,
                 folder_role VARCHAR2(255) NOT NULL,
                 content_hash VARCHAR2(128) NOT NULL,
                 run_at TIMESTAMP(6) NOT NULL,
                 outcome VARCHAR2(16) NOT NULL,
                 run_id VARCHAR2(64) NOT NULL,
                 error_message CLOB
             )",
            self.table()
        );
        self.with_conn(|conn| {
            conn.execute(&sql, &[])?;
            Ok(())
        })
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let table = self.table();
        let insert = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             VALUES (:1, :2, :3, :4, :5, :6, :7)",
            table
        );
        let run_at = run.run_at.naive_utc();
        self.with_conn(|conn| {
            conn.execute(
                &insert,
                &[
                    &run.script_name,
                    &run.folder_role,
                    &run.content_hash,
                    &run_at,
                    &run.outcome.as_str(),
                    &run.run_id,
                    &run.error_message,
                ],
            )?;
            // Same session, and the append is serialized by the connection lock
            let id = conn.query_row_as::<i64>(&format!("SELECT MAX(id) FROM {}", table), &[])?;
            self.autocommit(conn)?;
            Ok(id)
        })
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY run_at, id",
            SELECT_COLUMNS,
            self.table()
        );
        self.with_conn(|conn| {
            let rows = conn.query(&sql, &[])?;
            let mut runs = Vec::new();
            for row in rows {
                let row = row?;
                let run_at: NaiveDateTime = row.get(4)?;
                let outcome: String = row.get(5)?;
                runs.push(ScriptRun {
                    id: row.get(0)?,
                    script_name: row.get(1)?,
                    folder_role: row.get(2)?,
                    content_hash: row.get(3)?,
                    run_at: Utc.from_utc_datetime(&run_at),
                    outcome: outcome.parse::<RunOutcome>()?,
                    run_id: row.get(6)?,
                    error_message: row.get(7)?,
                });
            }
            Ok(runs)
        })
    }
}

#[cfg(test)]
#[path = "oracle_test.rs"]
mod tests;
