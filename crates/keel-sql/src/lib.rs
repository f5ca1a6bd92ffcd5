//! keel-sql - SQL text layer for Keel
//!
//! Script text is never parsed into an AST. This crate only knows enough
//! lexical structure per dialect (quotes, identifiers, comments) to split a
//! script into batches on its separator line and to substitute `{{Token}}`
//! placeholders.

pub mod dialect;
pub mod error;
pub mod splitter;
pub mod tokens;

pub use dialect::{
    BatchSeparator, DuckDbDialect, MySqlDialect, OracleDialect, PostgresDialect, SqlDialect,
    SqlServerDialect, SqliteDialect,
};
pub use error::{SqlError, SqlResult};
pub use splitter::{split_batches, Batch};
pub use tokens::{replace_tokens, TokenMap};
