//! Provider construction from configuration

use crate::duckdb::DuckDbProvider;
use crate::error::DbResult;
use crate::history_table::HistoryTable;
use crate::mysql::MySqlProvider;
use crate::postgres::PostgresProvider;
use crate::sqlite::SqliteProvider;
use crate::sqlserver::SqlServerProvider;
use crate::traits::Provider;
use keel_core::{DatabaseConfig, DbType, HistoryConfig};
use std::sync::Arc;

/// Build the provider for `config.db_type`.
///
/// No connection is made here; providers connect on first use, so a dry run
/// against a missing database creates nothing.
pub fn create_provider(
    config: &DatabaseConfig,
    history: &HistoryConfig,
) -> DbResult<Arc<dyn Provider>> {
    let history = HistoryTable::from(history);
    log::debug!("Creating {} provider for '{}'", config.db_type, config.name);
    let provider: Arc<dyn Provider> = match config.db_type {
        DbType::Sqlite => Arc::new(SqliteProvider::from_config(config, history)),
        DbType::DuckDb => Arc::new(DuckDbProvider::from_config(config, history)),
        DbType::Postgres => Arc::new(PostgresProvider::new(config.clone(), history)),
        DbType::MySql => Arc::new(MySqlProvider::new(config.clone(), history)),
        DbType::SqlServer => Arc::new(SqlServerProvider::new(config.clone(), history)),
        DbType::Oracle => oracle_provider(config, history)?,
    };
    Ok(provider)
}

#[cfg(feature = "oracle")]
fn oracle_provider(config: &DatabaseConfig, history: HistoryTable) -> DbResult<Arc<dyn Provider>> {
    Ok(Arc::new(crate::oracle::OracleProvider::new(
        config.clone(),
        history,
    )))
}

#[cfg(not(feature = "oracle"))]
fn oracle_provider(_config: &DatabaseConfig, _history: HistoryTable) -> DbResult<Arc<dyn Provider>> {
    Err(crate::error::DbError::NotImplemented {
        backend: DbType::Oracle.to_string(),
        feature: "build with the `oracle` feature to enable Oracle support".to_string(),
    })
}

#[cfg(test)]
#[path = "factory_test.rs"]
mod tests;
