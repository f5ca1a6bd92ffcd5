//! Database lookup for file-based engines (SQLite, DuckDB).
//!
//! A database is a file `<directory>/<name>.<ext>`. Lookup scans the
//! directory and compares folded file stems, so `CASEDATABASE.db` is found
//! when asked for `casedatabase`.

use crate::error::{DbError, DbResult};
use std::path::{Path, PathBuf};

pub(crate) const IN_MEMORY: &str = ":memory:";

/// Strip a recognized extension from a configured name.
pub(crate) fn logical_name<'a>(name: &'a str, extensions: &[&str]) -> &'a str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    }
}

/// Find the file whose stem folds equal to `name`.
pub(crate) fn find_database_file(
    directory: &Path,
    name: &str,
    extensions: &[&str],
    fold: impl Fn(&str) -> String,
) -> DbResult<Option<String>> {
    if name == IN_MEMORY {
        return Ok(Some(IN_MEMORY.to_string()));
    }
    if !directory.is_dir() {
        return Ok(None);
    }

    let wanted = fold(logical_name(name, extensions));
    let entries = std::fs::read_dir(directory).map_err(|e| {
        DbError::ConnectionError(format!("cannot read {}: {}", directory.display(), e))
    })?;

    let mut matches: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(String::from))
        .filter(|file_name| {
            extensions.iter().any(|ext| {
                let stem = logical_name(file_name, &[*ext]);
                stem.len() != file_name.len() && fold(stem) == wanted
            })
        })
        .collect();

    // Several case variants of one name: pick a stable one
    matches.sort();
    if matches.len() > 1 {
        log::warn!(
            "Several database files match '{}' in {}: {}; using {}",
            name,
            directory.display(),
            matches.join(", "),
            matches[0]
        );
    }
    Ok(matches.into_iter().next())
}

/// File name to create for `name`.
pub(crate) fn new_database_file(name: &str, extensions: &[&str], default_ext: &str) -> String {
    if name == IN_MEMORY || logical_name(name, extensions).len() != name.len() {
        name.to_string()
    } else {
        format!("{}.{}", name, default_ext)
    }
}

/// Path of a physical database file.
pub(crate) fn database_path(directory: &Path, physical: &str) -> PathBuf {
    directory.join(physical)
}

#[cfg(test)]
#[path = "file_catalog_test.rs"]
mod tests;
