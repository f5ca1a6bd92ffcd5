//! History command implementation

use anyhow::Result;
use keel_core::ScriptRun;
use keel_db::ProviderCore;
use keel_migrate::Migrator;
use std::sync::Arc;

use crate::cli::{GlobalArgs, HistoryArgs, OutputFormat};
use crate::commands::common::{self, format_time, load_project, short};

/// Execute the history command
pub(crate) async fn execute(args: &HistoryArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let options = project.migrate_options()?;
    let database = options.database.clone();
    let provider = project.provider()?;

    let runs = Migrator::new(Arc::clone(&provider), options).history().await?;
    let Some(runs) = runs else {
        match args.output {
            OutputFormat::Text => println!(
                "No history: database '{}' or its history table does not exist",
                database
            ),
            OutputFormat::Json => println!("[]"),
        }
        return Ok(());
    };

    let runs: Vec<ScriptRun> = match &args.script {
        Some(script) => {
            let wanted = provider.fold_name(script);
            runs.into_iter()
                .filter(|r| provider.fold_name(&r.script_name) == wanted)
                .collect()
        }
        None => runs,
    };

    match args.output {
        OutputFormat::Json => common::print_json(&runs)?,
        OutputFormat::Text => print_runs(&runs),
    }
    Ok(())
}

fn print_runs(runs: &[ScriptRun]) {
    if runs.is_empty() {
        println!("No scripts recorded");
        return;
    }

    let rows: Vec<Vec<String>> = runs
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                format_time(&r.run_at),
                r.script_name.clone(),
                r.folder_role.clone(),
                r.outcome.to_string(),
                short(&r.content_hash, 12).to_string(),
                short(&r.run_id, 8).to_string(),
                r.error_message.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    common::print_table(
        &["ID", "RUN AT", "SCRIPT", "FOLDER", "OUTCOME", "HASH", "RUN", "ERROR"],
        &rows,
    );

    let failures = runs.iter().filter(|r| !r.is_success()).count();
    println!();
    println!("{} rows, {} failures", runs.len(), failures);
}
