//! Provider trait definitions
//!
//! The provider surface is split by concern:
//! - [`ProviderCore`]: connection lifecycle, batch execution, transactions
//! - [`ProviderCatalog`]: database lookup and creation
//! - [`ProviderHistory`]: the history table
//!
//! [`Provider`] is the union of all three and is implemented automatically.
//! Implementations must be Send + Sync for async operation.

use crate::error::{DbError, DbResult};
use crate::history_table::history_by_script;
use async_trait::async_trait;
use keel_core::{DbType, NewScriptRun, ScriptHistory, ScriptRun};
use keel_sql::SqlDialect;
use std::collections::HashMap;

/// Connection lifecycle, execution and transaction control.
#[async_trait]
pub trait ProviderCore: Send + Sync {
    /// Engine this provider talks to
    fn db_type(&self) -> DbType;

    /// Lexical rules used to split scripts for this engine
    fn dialect(&self) -> &dyn SqlDialect;

    /// Normalize a name for comparison. Script names in the history and the
    /// file engines' database names compare through here; server engines
    /// follow their own catalog rules in [`ProviderCatalog::find_database`].
    fn fold_name(&self, name: &str) -> String {
        name.to_lowercase()
    }

    /// Open the connection used for migration work. `database` is the
    /// physical name returned by [`ProviderCatalog::find_database`] or
    /// [`ProviderCatalog::create_database`].
    async fn open(&self, database: &str) -> DbResult<()>;

    /// Close the migration connection. Closing twice is a no-op.
    async fn close(&self) -> DbResult<()>;

    /// Execute one batch on the open connection, inside the active
    /// transaction if there is one.
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    async fn begin(&self) -> DbResult<()>;

    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;
}

/// Database existence and creation.
///
/// Catalog calls do not need [`ProviderCore::open`]; server engines use a
/// short-lived administrative connection.
#[async_trait]
pub trait ProviderCatalog: ProviderCore {
    /// Physical name of the database `name` refers to under this engine's
    /// case rules, if any.
    async fn find_database(&self, name: &str) -> DbResult<Option<String>>;

    /// Create the database and return its physical name.
    async fn create_database(&self, name: &str) -> DbResult<String>;

    async fn database_exists(&self, name: &str) -> DbResult<bool> {
        Ok(self.find_database(name).await?.is_some())
    }

    /// Find the database, creating it when missing and `create` is set.
    /// Returns the physical name and whether it was created.
    async fn ensure_database(&self, name: &str, create: bool) -> DbResult<(String, bool)> {
        if let Some(physical) = self.find_database(name).await? {
            return Ok((physical, false));
        }
        if !create {
            return Err(DbError::DatabaseNotFound {
                name: name.to_string(),
            });
        }
        let physical = self.create_database(name).await?;
        Ok((physical, true))
    }
}

/// The append-only history table inside the target database.
#[async_trait]
pub trait ProviderHistory: ProviderCore {
    async fn history_exists(&self) -> DbResult<bool>;

    /// Create the history table (and its schema) if absent.
    async fn ensure_history_table(&self) -> DbResult<()>;

    /// Append a row and return its id.
    async fn append_run(&self, run: &NewScriptRun) -> DbResult<i64>;

    async fn all_runs(&self) -> DbResult<Vec<ScriptRun>>;

    /// Latest and last successful row per script, keyed by folded script name.
    async fn script_histories(&self) -> DbResult<HashMap<String, ScriptHistory>> {
        let runs = self.all_runs().await?;
        Ok(history_by_script(runs, |name| self.fold_name(name)))
    }
}

/// Full provider capability set.
pub trait Provider: ProviderCatalog + ProviderHistory {}

impl<T: ProviderCatalog + ProviderHistory + ?Sized> Provider for T {}
