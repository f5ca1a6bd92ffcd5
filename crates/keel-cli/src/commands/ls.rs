//! List command implementation

use anyhow::{Context, Result};
use keel_core::{discover, ExecutionPolicy};
use serde::Serialize;

use crate::cli::{GlobalArgs, LsArgs, OutputFormat};
use crate::commands::common::{self, load_project, short};

/// Script information for display
#[derive(Debug, Serialize)]
struct ScriptInfo {
    order: usize,
    name: String,
    folder: String,
    policy: ExecutionPolicy,
    hash: String,
    /// Environment script that the active environment would skip
    skipped_in_environment: bool,
    /// Folder only runs when the database is created
    only_after_create: bool,
}

/// Execute the ls command
pub(crate) async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let scripts_root = project.config.scripts_dir_absolute(&project.root);
    let environment = project
        .config
        .get_environment(project.target.as_deref())
        .context("Failed to resolve environment")?;

    let mut folders = project.config.migrations_folders();
    folders.sort_by_key(|f| f.precedence);

    let mut scripts = Vec::new();
    for folder in &folders {
        let found = discover(&scripts_root, folder)
            .with_context(|| format!("Failed to discover scripts in folder '{}'", folder.role))?;
        for unit in found.iter_from(scripts.len()) {
            let unit = unit.context("Failed to read script")?;
            scripts.push(ScriptInfo {
                order: unit.sequence + 1,
                skipped_in_environment: !unit.runs_in_environment(environment.as_deref()),
                name: unit.name.into_inner(),
                folder: unit.role.into_inner(),
                policy: unit.policy,
                hash: unit.hash,
                only_after_create: folder.only_after_create,
            });
        }
    }

    match args.output {
        OutputFormat::Json => common::print_json(&scripts)?,
        OutputFormat::Text => print_scripts(&scripts),
    }
    Ok(())
}

fn print_scripts(scripts: &[ScriptInfo]) {
    let rows: Vec<Vec<String>> = scripts
        .iter()
        .map(|s| {
            let note = if s.skipped_in_environment {
                "skipped (environment)"
            } else if s.only_after_create {
                "new database only"
            } else {
                "-"
            };
            vec![
                s.order.to_string(),
                s.name.clone(),
                s.folder.clone(),
                s.policy.to_string(),
                short(&s.hash, 12).to_string(),
                note.to_string(),
            ]
        })
        .collect();
    common::print_table(&["#", "SCRIPT", "FOLDER", "POLICY", "HASH", "NOTE"], &rows);
    println!();
    println!("{} scripts found", scripts.len());
}
