//! Migrate command implementation

use anyhow::{Context, Result};
use keel_core::{MigrationReport, ScriptAction};
use keel_migrate::Migrator;
use std::path::Path;

use crate::cli::{GlobalArgs, MigrateArgs, OutputFormat};
use crate::commands::common::{self, exit_code_for, load_project, ExitCode};

/// Execute the migrate command
pub(crate) async fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;

    let mut options = project.migrate_options()?;
    options.dry_run |= args.dry_run;
    options.create_database &= !args.no_create_database;
    options.baseline = args.baseline;
    options.rerun_changed_once = args.rerun_changed_once;
    if let Some(transaction) = args.transaction {
        options.transaction = transaction.into();
    }

    let provider = project.provider()?;
    let outcome = Migrator::new(provider, options).run().await;

    match args.output {
        OutputFormat::Text => print_report(&outcome.report),
        OutputFormat::Json => common::print_json(&outcome.report)?,
    }

    let saved = match &args.report {
        Some(path) => outcome
            .report
            .save(Path::new(path))
            .with_context(|| format!("Failed to write report to {}", path)),
        None => Ok(()),
    };

    match outcome.result {
        Ok(()) => saved,
        Err(e) => {
            // The run's own failure decides the exit code.
            if let Err(save_error) = saved {
                log::warn!("{:#}", save_error);
            }
            eprintln!("Error: {}", e);
            Err(ExitCode(exit_code_for(&e)).into())
        }
    }
}

/// Print the per-script table and summary.
fn print_report(report: &MigrationReport) {
    let shown: Vec<_> = report
        .scripts
        .iter()
        .filter(|s| s.action != ScriptAction::Skipped)
        .collect();

    if !shown.is_empty() {
        let rows: Vec<Vec<String>> = shown
            .iter()
            .map(|s| {
                vec![
                    s.script_name.clone(),
                    s.folder_role.clone(),
                    s.policy.to_string(),
                    s.action.to_string(),
                    if s.action == ScriptAction::Executed {
                        format!("{}ms", s.duration_ms)
                    } else {
                        "-".to_string()
                    },
                ]
            })
            .collect();
        common::print_table(&["SCRIPT", "FOLDER", "POLICY", "ACTION", "TIME"], &rows);
        println!();
    }

    let summary = report.summary();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!(
        "Database '{}'{}: {} executed, {} skipped, {} baselined, {} would run, {} failed, {} policy violations, {} rolled back",
        report.database,
        mode,
        summary.executed,
        summary.skipped,
        summary.baselined,
        summary.would_run,
        summary.failed,
        summary.policy_violations,
        summary.rolled_back
    );
    if report.database_created {
        println!("Database was created by this run");
    }
    if let Some(ms) = report.duration_ms() {
        println!("Run {} {} in {}ms", report.run_id, report.status, ms);
    }
}
