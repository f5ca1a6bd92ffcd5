//! Error types for keel-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Begin, commit or rollback failed (D003)
    #[error("[D003] Transaction control failed: {0}")]
    TransactionError(String),

    /// Target database missing and creation not allowed (D004)
    #[error("[D004] Database '{name}' does not exist and creation is disabled")]
    DatabaseNotFound { name: String },

    /// Not implemented (D005)
    #[error("[D005] Feature not implemented for {backend}: {feature}")]
    NotImplemented { backend: String, feature: String },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// A history row could not be decoded (D007)
    #[error("[D007] Invalid history row: {0}")]
    InvalidHistoryRow(String),

    /// Operation needs an open connection (D008)
    #[error("[D008] No open connection to the target database")]
    NotConnected,
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether the error means the server could not be reached or used.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionError(_) | DbError::NotConnected | DbError::DatabaseNotFound { .. }
        )
    }

    /// Reclassify an error raised by begin/commit/rollback.
    pub(crate) fn into_transaction(self, operation: &str) -> DbError {
        match self {
            DbError::ExecutionError(msg) => {
                DbError::TransactionError(format!("{}: {}", operation, msg))
            }
            other => other,
        }
    }
}

impl From<keel_core::CoreError> for DbError {
    fn from(err: keel_core::CoreError) -> Self {
        match err {
            keel_core::CoreError::EnvVarMissing { .. } => DbError::ConnectionError(err.to_string()),
            other => DbError::InvalidHistoryRow(other.to_string()),
        }
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error has no structured variant for open failures, so the
        // message is inspected.
        let msg = err.to_string();
        if msg.contains("IO Error") || msg.contains("Could not set lock on file") {
            DbError::ConnectionError(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::PermissionDenied
                ) =>
            {
                DbError::ConnectionError(err.to_string())
            }
            _ => DbError::ExecutionError(err.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => {
                let mut msg = format!("{}: {}", db.severity(), db.message());
                if let Some(detail) = db.detail() {
                    msg.push_str(&format!(" ({})", detail));
                }
                DbError::ExecutionError(msg)
            }
            None => DbError::ConnectionError(err.to_string()),
        }
    }
}

impl From<mysql_async::Error> for DbError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) => DbError::ExecutionError(e.to_string()),
            other => DbError::ConnectionError(other.to_string()),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Io { .. }
            | tiberius::error::Error::Tls(_)
            | tiberius::error::Error::Routing { .. } => DbError::ConnectionError(err.to_string()),
            other => DbError::ExecutionError(other.to_string()),
        }
    }
}

#[cfg(feature = "oracle")]
impl From<oracle::Error> for DbError {
    fn from(err: oracle::Error) -> Self {
        match err.db_error() {
            Some(db) if matches!(db.code(), 1017 | 12154 | 12514 | 12541) => {
                DbError::ConnectionError(err.to_string())
            }
            _ => DbError::ExecutionError(err.to_string()),
        }
    }
}
