//! Init command implementation - scaffolds a new Keel project

use anyhow::{Context, Result};
use keel_core::folder::DEFAULT_ROLES;
use keel_core::DbType;
use std::fs;
use std::path::Path;

use crate::cli::{GlobalArgs, InitArgs};

/// Scripts directory written into the starter config.
const SCRIPTS_DIR: &str = "db";

/// Execute the init command
pub(crate) async fn execute(args: &InitArgs, global: &GlobalArgs) -> Result<()> {
    let project_dir = Path::new(&global.project_dir);
    let db_type: DbType = args
        .database_type
        .parse()
        .context("Invalid --database-type")?;

    let name = match &args.name {
        Some(name) => name.clone(),
        None => project_name_from_dir(project_dir)?,
    };

    scaffold(project_dir, &name, db_type)?;

    println!("Created Keel project '{}' in {}", name, project_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit keel.yml to point at your {} database", db_type);
    println!("  2. Add scripts under {}/up", SCRIPTS_DIR);
    println!("  3. Run: keel migrate --dry-run");
    Ok(())
}

fn project_name_from_dir(dir: &Path) -> Result<String> {
    let absolute = dir
        .canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf());
    absolute
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .with_context(|| format!("Cannot derive a project name from {}", dir.display()))
}

/// Write `keel.yml` and one directory per default folder role.
pub(crate) fn scaffold(project_dir: &Path, name: &str, db_type: DbType) -> Result<()> {
    let config_path = project_dir.join("keel.yml");
    if config_path.exists() || project_dir.join("keel.yaml").exists() {
        anyhow::bail!(
            "A Keel project already exists in {}",
            project_dir.display()
        );
    }

    for role in DEFAULT_ROLES {
        let path = project_dir.join(SCRIPTS_DIR).join(role.path);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    fs::write(&config_path, starter_config(name, db_type))
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(())
}

/// Starter configuration text for `db_type`.
pub(crate) fn starter_config(name: &str, db_type: DbType) -> String {
    let safe_name = name.replace('"', "\\\"");
    let database = if db_type.is_file_based() {
        format!(
            r#"database:
  type: {db_type}
  name: "{safe_name}"
  directory: data
"#
        )
    } else {
        format!(
            r#"database:
  type: {db_type}
  name: "{safe_name}"
  host: localhost
  port: {port}
  username: keel
  password: "env:KEEL_DB_PASSWORD"
"#,
            port = db_type.default_port().unwrap_or_default()
        )
    };

    format!(
        r#"name: "{safe_name}"
scripts_dir: {SCRIPTS_DIR}

{database}
# per_script or whole_run
transaction: per_script
create_database: true

# Scripts named like `grants.PROD.env.sql` run only in the PROD environment
# environment: DEV

# Replaced in script text as {{{{Name}}}}
tokens: {{}}

# Override a folder's policy: run_once, run_on_change or run_always
# policies:
#   views: run_always
"#
    )
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
