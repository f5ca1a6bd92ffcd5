//! PostgreSQL provider

use crate::error::{DbError, DbResult};
use crate::history_table::{HistoryTable, SELECT_COLUMNS};
use crate::traits::{ProviderCatalog, ProviderCore, ProviderHistory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{DatabaseConfig, DbType, NewScriptRun, RunOutcome, ScriptRun};
use keel_sql::{PostgresDialect, SqlDialect};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_postgres::{Client, NoTls};

const DEFAULT_ADMIN_DATABASE: &str = "postgres";

/// PostgreSQL provider.
///
/// Catalog queries run on a short-lived connection to the admin database;
/// migration work runs on one connection to the target.
pub struct PostgresProvider {
    config: DatabaseConfig,
    history: HistoryTable,
    client: Mutex<Option<Client>>,
}

impl PostgresProvider {
    pub fn new(config: DatabaseConfig, history: HistoryTable) -> Self {
        Self {
            config,
            history,
            client: Mutex::new(None),
        }
    }

    /// Driver configuration for a connection to `database`.
    pub(crate) fn connect_config(&self, database: &str) -> DbResult<tokio_postgres::Config> {
        let mut pg = match &self.config.connection_string {
            Some(conn_str) => conn_str
                .parse::<tokio_postgres::Config>()
                .map_err(|e| DbError::ConnectionError(format!("invalid connection string: {}", e)))?,
            None => {
                let mut pg = tokio_postgres::Config::new();
                pg.host(self.config.host_or_default())
                    .port(self.config.port_or_default());
                if let Some(user) = &self.config.username {
                    pg.user(user);
                }
                if let Some(password) = self.config.resolved_password()? {
                    pg.password(password);
                }
                pg
            }
        };
        pg.dbname(database).application_name("keel");
        Ok(pg)
    }

    async fn connect(&self, database: &str) -> DbResult<Client> {
        let (client, connection) = self.connect_config(database)?.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("PostgreSQL connection error: {}", e);
            }
        });
        Ok(client)
    }

    async fn admin(&self) -> DbResult<Client> {
        let admin = self
            .config
            .admin_database
            .as_deref()
            .unwrap_or(DEFAULT_ADMIN_DATABASE);
        self.connect(admin).await
    }

    async fn client(&self) -> DbResult<MappedMutexGuard<'_, Client>> {
        MutexGuard::try_map(self.client.lock().await, |c| c.as_mut())
            .map_err(|_| DbError::NotConnected)
    }

    fn table(&self) -> String {
        format!(
            "{}.{}",
            PostgresDialect.quote_ident(&self.history.schema),
            PostgresDialect.quote_ident(&self.history.table)
        )
    }

    async fn transaction_sql(&self, sql: &str) -> DbResult<()> {
        let client = self.client().await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| DbError::from(e).into_transaction(sql))
    }
}

/// Pick the database `name` refers to under PostgreSQL's identifier rules.
///
/// Quoted database names are case-sensitive, so an exact `datname` wins.
/// Otherwise the name resolves as an unquoted identifier would, to its
/// folded form. A differently cased name is never matched.
fn resolve_datname<'a>(
    datnames: &'a [String],
    name: &str,
    folded: &str,
) -> Option<&'a String> {
    datnames
        .iter()
        .find(|d| d.as_str() == name)
        .or_else(|| datnames.iter().find(|d| d.as_str() == folded))
}

#[async_trait]
impl ProviderCore for PostgresProvider {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    fn dialect(&self) -> &dyn SqlDialect {
        &PostgresDialect
    }

    /// Unquoted identifiers are downcased, ASCII letters only.
    fn fold_name(&self, name: &str) -> String {
        name.to_ascii_lowercase()
    }

    async fn open(&self, database: &str) -> DbResult<()> {
        let client = self.connect(database).await?;
        *self.client.lock().await = Some(client);
        log::debug!(
            "Opened PostgreSQL database {} on {}",
            database,
            self.config.server_label()
        );
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        // Dropping the client ends the spawned connection task
        self.client.lock().await.take();
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sql("BEGIN").await
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sql("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        // Outside a transaction PostgreSQL only warns
        self.transaction_sql("ROLLBACK").await
    }
}

#[async_trait]
impl ProviderCatalog for PostgresProvider {
    async fn find_database(&self, name: &str) -> DbResult<Option<String>> {
        let admin = self.admin().await?;
        let rows = admin
            .query(
                "SELECT datname FROM pg_database WHERE NOT datistemplate ORDER BY datname",
                &[],
            )
            .await?;
        let datnames: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        Ok(resolve_datname(&datnames, name, &self.fold_name(name)).cloned())
    }

    async fn create_database(&self, name: &str) -> DbResult<String> {
        let physical = self.fold_name(name);
        let admin = self.admin().await?;
        admin
            .batch_execute(&format!(
                "CREATE DATABASE {}",
                PostgresDialect.quote_ident(&physical)
            ))
            .await?;
        log::info!("Created PostgreSQL database {}", physical);
        Ok(physical)
    }
}

#[async_trait]
impl ProviderHistory for PostgresProvider {
    async fn history_exists(&self) -> DbResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables
                                WHERE table_schema = $1 AND table_name = $2)",
                &[&self.history.schema, &self.history.table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn ensure_history_table(&self) -> DbResult<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {table} (
                 id BIGSERIAL PRIMARY KEY,
                 script_name TEXT NOT NULL,
                 folder_role TEXT NOT NULL,
                 content_hash TEXT NOT NULL,
                 run_at TIMESTAMPTZ NOT NULL,
                 outcome TEXT NOT NULL,
                 run_id TEXT NOT NULL,
                 error_message TEXT
             );",
            schema = PostgresDialect.quote_ident(&self.history.schema),
            table = self.table()
        );
        self.execute_batch(&sql).await
    }

    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64> {
        let sql = format!(
            "INSERT INTO {} (script_name, folder_role, content_hash, run_at, outcome, run_id, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
            self.table()
        );
        let client = self.client().await?;
        let row = client
            .query_one(
                &sql,
                &[
                    &run.script_name,
                    &run.folder_role,
                    &run.content_hash,
                    &run.run_at,
                    &run.outcome.as_str(),
                    &run.run_id,
                    &run.error_message,
                ],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY run_at, id",
            SELECT_COLUMNS,
            self.table()
        );
        let client = self.client().await?;
        let rows = client.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| -> DbResult<ScriptRun> {
                let outcome: String = row.get(5);
                Ok(ScriptRun {
                    id: row.get(0),
                    script_name: row.get(1),
                    folder_role: row.get(2),
                    content_hash: row.get(3),
                    run_at: row.get::<_, DateTime<Utc>>(4),
                    outcome: outcome.parse::<RunOutcome>()?,
                    run_id: row.get(6),
                    error_message: row.get(7),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
