//! MySQL / MariaDB provider

use crate::error::{DbError, DbResult};
use crate::history_table::{HistoryTable, RawRun};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use keel_core::history::format_timestamp;
use keel_core::{DatabaseConfig, DbType, NewScriptRun, ScriptRun};
use keel_sql::{MySqlDialect, SqlDialect};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

type HistoryRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
);

/// MySQL provider. The history table lives in the target database under
/// its flat name. DDL statements commit implicitly on MySQL, so a rollback
/// only undoes data changes.
pub struct MySqlProvider {
    config: DatabaseConfig,
    history: HistoryTable,
    conn: Mutex<Option<Conn>>,
}

impl MySqlProvider {
    pub fn new(config: DatabaseConfig, history: HistoryTable) -> Self {
        Self {
            config,
            history,
            conn: Mutex::new(None),
        }
    }

    /// Connection options; `None` connects without selecting a database.
    pub(crate) fn connect_opts(&self, database: Option<&str>) -> DbResult<Opts> {
        let builder = match &self.config.connection_string {
            Some(url) => OptsBuilder::from_opts(
                Opts::from_url(url)
                    .map_err(|e| DbError::ConnectionError(format!("invalid connection URL: {}", e)))?,
            ),
            None => OptsBuilder::default()
                .ip_or_hostname(self.config.host_or_default())
                .tcp_port(self.config.port_or_default())
                .user(self.config.username.clone())
                .pass(self.config.resolved_password()?),
        };
        Ok(builder
            .db_name(database.map(String::from))
            .init(vec!["SET NAMES utf8mb4"])
            .into())
    }

    async fn connect(&self, database: Option<&str>) -> DbResult<Conn> {
        Ok(Conn::new(self.connect_opts(database)?).await?)
    }

    async fn conn(&self) -> DbResult<MappedMutexGuard<'_, Conn>> {
        MutexGuard::try_map(self.conn.lock().await, |c| c.as_mut())
            .map_err(|_| DbError::NotConnected)
    }

    fn table(&self) -> String {
        MySqlDialect.quote_ident(&self.history.flat_name())
    }

    async fn transaction_sql(&self, sql: &str) -> DbResult<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(sql)
            .await
            .map_err(|e| DbError::from(e).into_transaction(sql))
    }
}

/// Find `name` among schema names. Database names are directory names and
/// compare case-sensitively unless `lower_case_table_names` is 1 or 2.
fn match_schema(
    names: Vec<String>,
    name: &str,
    case_insensitive: bool,
    fold: impl Fn(&str) -> String,
) -> Option<String> {
    if case_insensitive {
        let wanted = fold(name);
        names.into_iter().find(|n| fold(n) == wanted)
    } else {
        names.into_iter().find(|n| n == name)
    }
}

#[async_trait]
impl ProviderCore for MySqlProvider {
    fn db_type(&self) -> DbType {
        DbType::MySql
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &MySqlDialect
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let conn = self.connect(Some(database)).await?;
        let previous = self.conn.lock().await.replace(conn);
        if let Some(old) = previous {
            old.disconnect().await?;
        }
        log::debug!(
            "Opened MySQL database {} on {}",
            database,
            self.config.server_label()
        );
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await?;
        }
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sql("START TRANSACTION").await
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sql("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.transaction_sql("ROLLBACK").await
    }
}

#[async_trait]
impl ProviderCatalog for MySqlProvider {
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        let mut admin = self.connect(None).await?;
        let names: Vec<String> = admin
            .query("SELECT SCHEMA_NAME FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME")
            .await?;
        let lower_case: Option<i64> = admin
            .query_first("SELECT @@lower_case_table_names")
            .await?;
        admin.disconnect().await?;
        let case_insensitive = lower_case.unwrap_or(0) != 0;
        Ok(match_schema(names, name, case_insensitive, |n| self.fold_name(n)))
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let mut admin = self.connect(None).await?;
        admin
            .query_drop(format!(
                "CREATE DATABASE {} CHARACTER SET utf8mb4",
                MySqlDialect.quote_ident(name)
            ))
            .await?;
        admin.disconnect().await?;
        log::info!("Created MySQL database {}", name);
        Ok(name.to_string())
    }
}

#[async_trait]
impl ProviderHistory for MySqlProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        let mut conn = self.conn().await?;
        let count: Option<i64> = conn
            .exec_first(
                "SELECT COUNT(*) FROM information_schema.TABLES
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
                (self.history.flat_name(),),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                 script_name VARCHAR(512) NOT NULL,
                 folder_role VARCHAR(255) NOT NULL,
                 content_hash VARCHAR(128) NOT NULL,
                 run_at DATETIME(6) NOT NULL,
                 outcome VARCHAR(16) NOT NULL,
                 run_id VARCHAR(64) NOT NULL,
                 error_message TEXT NULL
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.table()
        );
        self.execute_batch(&sql).await
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.table()
        );
        let mut conn = self.conn().await?;
        conn.exec_drop(
            sql,
            (
                run.script_name.as_str(),
                run.folder_role.as_str(),
                run.content_hash.as_str(),
                format_timestamp(&run.run_at),
                run.outcome.as_str(),
                run.run_id.as_str(),
                run.error_message.as_deref(),
            ),
        )
        .await?;
        let id = conn
            .last_insert_id()
            .ok_or_else(|| DbError::ExecutionError("history insert returned no id".to_string()))?;
        i64::try_from(id).map_err(|e| DbError::InvalidHistoryRow(e.to_string()))
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT id, script_name, folder_role, content_hash,
                    DATE_FORMAT(run_at, '%Y-%m-%d %H:%i:%s.%f'),
                    outcome, run_id, error_message
             FROM {} ORDER BY run_at, id",
            self.table()
        );
        let mut conn = self.conn().await?;
        let rows: Vec<HistoryRow> = conn.query(sql).await?;
        rows.into_iter()
            .map(
                |(id, script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)| {
                    RawRun {
                        id,
                        script_name,
                        folder_role,
                        content_hash,
                        run_at,
                        outcome,
                        run_id,
                        error_message,
                    }
                    .decode()
                },
            )
            .collect()
    }
}

#[cfg(test)]
#[path = "mysql_test.rs"]
mod tests;
