use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_migrate_flags() {
    let cli = Cli::try_parse_from([
        "keel",
        "-p",
        "project",
        "migrate",
        "--dry-run",
        "--transaction",
        "whole-run",
        "--no-create-database",
        "--report",
        "out/report.json",
        "--output",
        "json",
        "--target",
        "prod",
    ])
    .unwrap();

    assert_eq!(cli.global.project_dir, "project");
    assert_eq!(cli.global.target.as_deref(), Some("prod"));
    match cli.command {
        Commands::Migrate(args) => {
            assert!(args.dry_run);
            assert_eq!(args.transaction, Some(TransactionArg::WholeRun));
            assert!(args.no_create_database);
            assert!(!args.baseline);
            assert_eq!(args.report.as_deref(), Some("out/report.json"));
            assert_eq!(args.output, OutputFormat::Json);
        }
        other => panic!("expected migrate, got {:?}", other),
    }
}

#[test]
fn test_transaction_arg_maps_to_mode() {
    assert_eq!(
        TransactionMode::from(TransactionArg::PerScript),
        TransactionMode::PerScript
    );
    assert_eq!(
        TransactionMode::from(TransactionArg::WholeRun),
        TransactionMode::WholeRun
    );
}

#[test]
fn test_rejects_unknown_output() {
    assert!(Cli::try_parse_from(["keel", "ls", "--output", "yaml"]).is_err());
}
