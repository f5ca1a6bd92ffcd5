//! SQL Server provider
//!
//! Transaction control and script batches go through `simple_query` (a plain
//! SQL batch). Issuing BEGIN TRANSACTION through an RPC call leaves the
//! server reporting a transaction count mismatch (error 266).

use crate::error::{DbError, DbResult};
use crate::history_table::{HistoryTable, SELECT_COLUMNS};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use keel_core::{DatabaseConfig, DbType, NewScriptRun, RunOutcome, ScriptRun};
use keel_sql::{SqlDialect, SqlServerDialect};
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

const DEFAULT_ADMIN_DATABASE: &str = "master";

/// SQL Server provider.
pub struct SqlServerProvider {
    config: DatabaseConfig,
    history: HistoryTable,
    client: Mutex<Option<TdsClient>>,
}

impl SqlServerProvider {
    pub fn new(config: DatabaseConfig, history: HistoryTable) -> Self {
        Self {
            config,
            history,
            client: Mutex::new(None),
        }
    }

    /// Driver configuration for a connection to `database`.
    pub(crate) fn build_config(&self, database: &str) -> DbResult<Config> {
        let mut config = match &self.config.connection_string {
            Some(ado) => Config::from_ado_string(ado)
                .map_err(|e| DbError::ConnectionError(format!("invalid connection string: {}", e)))?,
            None => {
                let mut config = Config::new();
                config.host(self.config.host_or_default());
                config.port(self.config.port_or_default());
                let user = self.config.username.as_deref().unwrap_or("sa");
                let password = self.config.resolved_password()?.unwrap_or_default();
                config.authentication(AuthMethod::sql_server(user, password));
                config.trust_cert();
                config
            }
        };
        config.database(database);
        config.application_name("keel");
        Ok(config)
    }

    async fn connect(&self, database: &str) -> DbResult<TdsClient> {
        let config = self.build_config(database)?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        tcp.set_nodelay(true).ok();
        Ok(Client::connect(config, tcp.compat_write()).await?)
    }

    async fn admin(&self) -> DbResult<TdsClient> {
        let admin = self
            .config
            .admin_database
            .as_deref()
            .unwrap_or(DEFAULT_ADMIN_DATABASE);
        self.connect(admin).await
    }

    async fn client(&self) -> DbResult<MappedMutexGuard<'_, TdsClient>> {
        MutexGuard::try_map(self.client.lock().await, |c| c.as_mut())
            .map_err(|_| DbError::NotConnected)
    }

    fn table(&self) -> String {
        format!(
            "{}.{}",
            SqlServerDialect.quote_ident(&self.history.schema),
            SqlServerDialect.quote_ident(&self.history.table)
        )
    }

    /// Run `sql` as a plain batch and drain every result set, so errors
    /// raised by later statements surface here.
    async fn run_batch(client: &mut TdsClient, sql: &str) -> DbResult<()> {
        client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn transaction_sql(&self, sql: &str) -> DbResult<()> {
        let mut client = self.client().await?;
        Self::run_batch(&mut client, sql)
            .await
            .map_err(|e| e.into_transaction(sql))
    }
}

fn text_column(row: &Row, idx: usize) -> DbResult<String> {
    row.try_get::<&str, _>(idx)?
        .map(String::from)
        .ok_or_else(|| DbError::InvalidHistoryRow(format!("column {} is NULL", idx)))
}

fn decode_row(row: &Row) -> DbResult<ScriptRun> {
    let id: i64 = row
        .try_get(0)?
        .ok_or_else(|| DbError::InvalidHistoryRow("id is NULL".to_string()))?;
    let run_at: NaiveDateTime = row
        .try_get(4)?
        .ok_or_else(|| DbError::InvalidHistoryRow("run_at is NULL".to_string()))?;
    Ok(ScriptRun {
        id,
        script_name: text_column(row, 1)?,
        folder_role: text_column(row, 2)?,
        content_hash: text_column(row, 3)?,
        run_at: Utc.from_utc_datetime(&run_at),
        outcome: text_column(row, 5)?.parse::<RunOutcome>()?,
        run_id: text_column(row, 6)?,
        error_message: row.try_get::<&str, _>(7)?.map(String::from),
    })
}

#[async_trait]
impl ProviderCore for SqlServerProvider {
    fn db_type(&self) -> DbType {
        DbType::SqlServer
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &SqlServerDialect
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let client = self.connect(database).await?;
        let previous = self.client.lock().await.replace(client);
        if let Some(old) = previous {
            old.close().await?;
        }
        log::debug!(
            "Opened SQL Server database {} on {}",
            database,
            self.config.server_label()
        );
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.close().await?;
        }
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let mut client = self.client().await?;
        Self::run_batch(&mut client, sql).await
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sql("BEGIN TRANSACTION").await
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sql("COMMIT TRANSACTION").await
    }

    async fn rollback(&self) -> DbResult<()> {
        // Severe errors roll the transaction back server-side
        self.transaction_sql("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await
    }
}

#[async_trait]
impl ProviderCatalog for SqlServerProvider {
    /// The comparison runs on the server, so the catalog collation decides
    /// whether names differing only in case are the same database.
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        let mut admin = self.admin().await?;
        let row = admin
            .query("SELECT name FROM sys.databases WHERE name = @P1", &[&name])
            .await?
            .into_row()
            .await?;
        admin.close().await?;
        Ok(row
            .as_ref()
            .and_then(|r| r.try_get::<&str, _>(0).ok().flatten())
            .map(String::from))
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let mut admin = self.admin().await?;
        Self::run_batch(
            &mut admin,
            &format!("CREATE DATABASE {}", SqlServerDialect.quote_ident(name)),
        )
        .await?;
        admin.close().await?;
        log::info!("Created SQL Server database {}", name);
        Ok(name.to_string())
    }
}

#[async_trait]
impl ProviderHistory for SqlServerProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        let mut client = self.client().await?;
        let row = client
            .query(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES
                 WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2",
                &[&self.history.schema.as_str(), &self.history.table.as_str()],
            )
            .await?
            .into_row()
            .await?;
        let count: i32 = match row {
            Some(row) => row.try_get(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count > 0)
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        let schema = &self.history.schema;
        let sql = format!(
            "IF NOT EXISTS (SELECT * FROM sys.schemas WHERE name = N'{schema_lit}')
             BEGIN
                 EXEC('CREATE SCHEMA {schema_ident}')
             END;
             IF OBJECT_ID(N'{table_lit}', N'U') IS NULL
             BEGIN
                 CREATE TABLE {table} (
                     id BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY,
                     script_name NVARCHAR(512) NOT NULL,
                     folder_role NVARCHAR(255) NOT NULL,
                     content_hash NVARCHAR(128) NOT NULL,
                     run_at DATETIME2(6) NOT NULL,
                     outcome NVARCHAR(16) NOT NULL,
                     run_id NVARCHAR(64) NOT NULL,
                     error_message NVARCHAR(MAX) NULL
                 )
             END",
            schema_lit = schema.replace('\'', "''"),
            schema_ident = SqlServerDialect.quote_ident(schema).replace('\'', "''"),
            table_lit = self.table().replace('\'', "''"),
            table = self.table()
        );
        self.execute_batch(&sql).await
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             OUTPUT INSERTED.id
             VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7)",
            self.table()
        );
        let mut client = self.client().await?;
        let row = client
            .query(
                sql,
                &[
                    &run.script_name.as_str(),
                    &run.folder_role.as_str(),
                    &run.content_hash.as_str(),
                    &run.run_at.naive_utc(),
                    &run.outcome.as_str(),
                    &run.run_id.as_str(),
                    &run.error_message.as_deref(),
                ],
            )
            .await?
            .into_row()
            .await?;
        let id = match row {
            Some(row) => row.try_get::<i64, _>(0)?,
            None => None,
        };
        id.ok_or_else(|| DbError::ExecutionError("history insert returned no id".to_string()))
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY run_at, id",
            SELECT_COLUMNS,
            self.table()
        );
        let mut client = self.client().await?;
        let rows = client.simple_query(sql).await?.into_first_result().await?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
#[path = "sqlserver_test.rs"]
mod tests;
