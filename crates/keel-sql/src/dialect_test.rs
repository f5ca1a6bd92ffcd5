use super::*;

#[test]
fn test_quote_ident() {
    assert_eq!(PostgresDialect.quote_ident("user"), "\"user\"");
    assert_eq!(DuckDbDialect.quote_ident("user\"name"), "\"user\"\"name\"");
    assert_eq!(SqlServerDialect.quote_ident("a]b"), "[a]]b]");
    assert_eq!(MySqlDialect.quote_ident("a`b"), "`a``b`");
}

#[test]
fn test_separators() {
    assert_eq!(SqlServerDialect.separator().keyword(), "GO");
    assert!(SqlServerDialect.separator().allows_repeat_count());
    assert!(!PostgresDialect.separator().allows_repeat_count());
    assert_eq!(OracleDialect.separator(), BatchSeparator::Slash);
    assert_eq!(OracleDialect.separator().keyword(), "/");
}

#[test]
fn test_lexical_flags() {
    assert!(MySqlDialect.backslash_escapes());
    assert!(MySqlDialect.hash_comments());
    assert!(!PostgresDialect.hash_comments());
    assert!(PostgresDialect.dollar_quotes());
    assert!(SqlServerDialect.nested_block_comments());
    assert!(!MySqlDialect.nested_block_comments());
}

#[test]
fn test_trait_object_names() {
    let dialects: Vec<Box<dyn SqlDialect>> = vec![
        Box::new(SqlServerDialect),
        Box::new(PostgresDialect),
        Box::new(MySqlDialect),
        Box::new(OracleDialect),
        Box::new(SqliteDialect),
        Box::new(DuckDbDialect),
    ];
    let names: Vec<&str> = dialects.iter().map(|d| d.name()).collect();
    assert_eq!(
        names,
        vec!["sqlserver", "postgres", "mysql", "oracle", "sqlite", "duckdb"]
    );
}
