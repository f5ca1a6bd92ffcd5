//! Error types for keel-sql

use thiserror::Error;

/// SQL text processing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
    /// Unterminated string, identifier or block comment (S001)
    #[error("[S001] Unterminated {kind} starting at line {line}")]
    Unterminated { kind: &'static str, line: usize },

    /// Separator repeat count out of range (S002)
    #[error("[S002] Invalid separator repeat count '{count}' at line {line}")]
    InvalidRepeatCount { count: String, line: usize },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
