//! SQL dialect abstraction
//!
//! A dialect describes the lexical rules the batch splitter needs: which
//! quoting and comment forms exist and which line separates batches.

/// Separator line that ends a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSeparator {
    /// `GO` on its own line; `repeat_count` allows `GO <n>`
    Go { repeat_count: bool },
    /// `/` on its own line
    Slash,
}

impl BatchSeparator {
    /// The separator keyword as written in scripts.
    pub fn keyword(&self) -> &'static str {
        match self {
            BatchSeparator::Go { .. } => "GO",
            BatchSeparator::Slash => "/",
        }
    }

    pub fn allows_repeat_count(&self) -> bool {
        matches!(self, BatchSeparator::Go { repeat_count: true })
    }
}

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Batch separator for this dialect
    fn separator(&self) -> BatchSeparator {
        BatchSeparator::Go {
            repeat_count: false,
        }
    }

    /// Quote an identifier for this dialect
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// `\` escapes the next character inside quoted strings
    fn backslash_escapes(&self) -> bool {
        false
    }

    /// `[...]` delimits identifiers
    fn bracket_identifiers(&self) -> bool {
        false
    }

    /// `` `...` `` delimits identifiers
    fn backtick_identifiers(&self) -> bool {
        false
    }

    /// `$tag$ ... $tag$` delimits string bodies
    fn dollar_quotes(&self) -> bool {
        false
    }

    /// `#` starts a line comment
    fn hash_comments(&self) -> bool {
        false
    }

    /// Block comments nest (`/* /* */ */`)
    fn nested_block_comments(&self) -> bool {
        false
    }
}

/// SQL Server (T-SQL) dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn separator(&self) -> BatchSeparator {
        BatchSeparator::Go { repeat_count: true }
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn bracket_identifiers(&self) -> bool {
        true
    }

    fn nested_block_comments(&self) -> bool {
        true
    }
}

/// PostgreSQL dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn dollar_quotes(&self) -> bool {
        true
    }

    fn nested_block_comments(&self) -> bool {
        true
    }
}

/// MySQL / MariaDB dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn backslash_escapes(&self) -> bool {
        true
    }

    fn backtick_identifiers(&self) -> bool {
        true
    }

    fn hash_comments(&self) -> bool {
        true
    }
}

/// Oracle dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn separator(&self) -> BatchSeparator {
        BatchSeparator::Slash
    }
}

/// SQLite dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn bracket_identifiers(&self) -> bool {
        true
    }

    fn backtick_identifiers(&self) -> bool {
        true
    }
}

/// DuckDB SQL dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl SqlDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn dollar_quotes(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
