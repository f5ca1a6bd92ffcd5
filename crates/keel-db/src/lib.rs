//! keel-db - Database providers for Keel
//!
//! This crate provides the provider traits the migrator drives and one
//! backend per supported engine. Oracle support is behind the `oracle`
//! feature because it links against the Oracle client libraries.

pub mod duckdb;
pub mod error;
pub mod factory;
pub(crate) mod file_catalog;
pub mod history_table;
pub mod mysql;
#[cfg(feature = "oracle")]
pub mod oracle;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;
pub mod traits;

pub use duckdb::DuckDbProvider;
pub use error::{DbError, DbResult};
pub use factory::create_provider;
pub use history_table::HistoryTable;
pub use mysql::MySqlProvider;
#[cfg(feature = "oracle")]
pub use oracle::OracleProvider;
pub use postgres::PostgresProvider;
pub use sqlite::SqliteProvider;
pub use sqlserver::SqlServerProvider;
pub use traits::{Provider, ProviderCatalog, ProviderCore, ProviderHistory};
