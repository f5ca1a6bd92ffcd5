use super::*;

#[test]
fn test_policy_violation_message() {
    let err = MigrateError::PolicyViolation {
        script: "up/0001_init.sql".to_string(),
        role: "up".to_string(),
        recorded_hash: "aaa".to_string(),
        current_hash: "bbb".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.starts_with("[M004]"));
    assert!(msg.contains("up/0001_init.sql"));
    assert!(err.is_policy_violation());
    assert!(!err.is_script_failure());
}

#[test]
fn test_sql_execution_mentions_unrecorded_failure() {
    let err = MigrateError::SqlExecution {
        script: "up/0002.sql".to_string(),
        role: "up".to_string(),
        batch_index: 3,
        recorded: false,
        source: DbError::ExecutionError("syntax error".to_string()),
    };
    let msg = err.to_string();
    assert!(msg.contains("batch 3"));
    assert!(msg.contains("not recorded"));
    assert!(err.is_script_failure());
    assert!(!err.is_recorded());
}

#[test]
fn test_recorded_failure_message() {
    let err = MigrateError::Transaction {
        script: "up/0002.sql".to_string(),
        recorded: true,
        source: DbError::TransactionError("COMMIT: lost".to_string()),
    };
    assert!(!err.to_string().contains("not recorded"));
    assert!(err.is_recorded());
}
