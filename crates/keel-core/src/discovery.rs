//! Script discovery for a migrations folder.
//!
//! Enumeration happens eagerly so a missing or unreadable folder fails before
//! anything runs. File contents are read lazily by [`FolderScripts::iter`],
//! and every call to `iter` re-reads the files from disk.

use crate::checksum::compute_checksum;
use crate::error::{CoreError, CoreResult};
use crate::folder::{ExecutionPolicy, MigrationsFolder};
use crate::natural_sort::natural_cmp;
use crate::script::{decode_script_bytes, file_name_of, is_everytime_file, ScriptName, ScriptUnit};
use std::path::{Path, PathBuf};

/// The ordered `.sql` files of one migrations folder.
#[derive(Debug, Clone)]
pub struct FolderScripts {
    folder: MigrationsFolder,
    entries: Vec<ScriptEntry>,
}

#[derive(Debug, Clone)]
struct ScriptEntry {
    name: ScriptName,
    path: PathBuf,
}

/// Enumerate the scripts of `folder` below `scripts_root`.
///
/// Names are the paths relative to `scripts_root` with `/` separators and are
/// sorted with [`natural_cmp`]. Hidden files and directories are ignored.
pub fn discover(scripts_root: &Path, folder: &MigrationsFolder) -> CoreResult<FolderScripts> {
    let dir = scripts_root.join(&folder.path);

    if !dir.is_dir() {
        if folder.required {
            return Err(CoreError::FolderNotFound {
                role: folder.role.to_string(),
                path: dir.display().to_string(),
            });
        }
        log::debug!(
            "Optional folder '{}' not present at {}",
            folder.role,
            dir.display()
        );
        return Ok(FolderScripts {
            folder: folder.clone(),
            entries: Vec::new(),
        });
    }

    let mut entries = Vec::new();
    collect_sql_files(scripts_root, &dir, folder, &mut entries)?;
    entries.sort_by(|a, b| natural_cmp(&a.name, &b.name));

    log::debug!(
        "Discovered {} script(s) in folder '{}'",
        entries.len(),
        folder.role
    );

    Ok(FolderScripts {
        folder: folder.clone(),
        entries,
    })
}

fn collect_sql_files(
    scripts_root: &Path,
    dir: &Path,
    folder: &MigrationsFolder,
    out: &mut Vec<ScriptEntry>,
) -> CoreResult<()> {
    let unreadable = |e: std::io::Error| CoreError::FolderUnreadable {
        role: folder.role.to_string(),
        path: dir.display().to_string(),
        source: e,
    };

    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();

        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }

        if path.is_dir() {
            collect_sql_files(scripts_root, &path, folder, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("sql"))
        {
            let name = relative_name(scripts_root, &path)?;
            out.push(ScriptEntry { name, path });
        }
    }

    Ok(())
}

fn relative_name(scripts_root: &Path, path: &Path) -> CoreResult<ScriptName> {
    let relative = path.strip_prefix(scripts_root).unwrap_or(path);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    ScriptName::try_from(joined).map_err(|message| CoreError::ConfigInvalid { message })
}

impl FolderScripts {
    /// The folder these scripts belong to.
    pub fn folder(&self) -> &MigrationsFolder {
        &self.folder
    }

    /// Number of scripts in the folder.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the folder has no scripts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Script names in execution order, without reading file contents.
    pub fn names(&self) -> impl Iterator<Item = &ScriptName> {
        self.entries.iter().map(|e| &e.name)
    }

    /// Read the scripts in order, numbering them from zero.
    pub fn iter(&self) -> impl Iterator<Item = CoreResult<ScriptUnit>> + '_ {
        self.iter_from(0)
    }

    /// Read the scripts in order, numbering them from `first_sequence`.
    pub fn iter_from(
        &self,
        first_sequence: usize,
    ) -> impl Iterator<Item = CoreResult<ScriptUnit>> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(move |(i, entry)| self.load(entry, first_sequence + i))
    }

    fn load(&self, entry: &ScriptEntry, sequence: usize) -> CoreResult<ScriptUnit> {
        let bytes = std::fs::read(&entry.path).map_err(|e| CoreError::ScriptUnreadable {
            path: entry.path.display().to_string(),
            source: e,
        })?;
        let text = decode_script_bytes(&bytes, &entry.name)?;
        let hash = compute_checksum(&text);

        let policy = if is_everytime_file(file_name_of(&entry.name)) {
            ExecutionPolicy::RunAlways
        } else {
            self.folder.policy
        };

        Ok(ScriptUnit {
            name: entry.name.clone(),
            path: entry.path.clone(),
            role: self.folder.role.clone(),
            policy,
            text,
            hash,
            sequence,
        })
    }
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod tests;
