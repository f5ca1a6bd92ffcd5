use super::*;
use keel_core::{NewScriptRun, ScriptRun};

fn success(id: i64, hash: &str) -> ScriptRun {
    NewScriptRun::success("up/1.sql", "up", hash, "run-1").into_run(id)
}

fn failure(id: i64, hash: &str) -> ScriptRun {
    NewScriptRun::failure("up/1.sql", "up", hash, "run-1", "boom").into_run(id)
}

/// History built from rows in the order they were appended.
fn history(rows: Vec<ScriptRun>) -> ScriptHistory {
    let mut rows = rows.into_iter();
    let mut history = ScriptHistory::new(rows.next().unwrap());
    for row in rows {
        history.observe(row);
    }
    history
}

#[test]
fn test_unseen_script_runs() {
    for policy in [
        ExecutionPolicy::RunOnce,
        ExecutionPolicy::RunOnChange,
        ExecutionPolicy::RunAlways,
    ] {
        assert_eq!(decide(policy, "h", None, false), Decision::Run(RunReason::New));
    }
}

#[test]
fn test_unchanged_is_skipped() {
    let applied = history(vec![success(1, "h1")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "h1", Some(&applied), false),
        Decision::Skip
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "h1", Some(&applied), false),
        Decision::Skip
    );
}

#[test]
fn test_run_always_ignores_hash() {
    let applied = history(vec![success(1, "h1")]);
    assert_eq!(
        decide(ExecutionPolicy::RunAlways, "h1", Some(&applied), false),
        Decision::Run(RunReason::Always)
    );
}

#[test]
fn test_run_on_change_reruns_changed() {
    let applied = history(vec![success(1, "h1")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "h2", Some(&applied), false),
        Decision::Run(RunReason::Changed)
    );
}

#[test]
fn test_run_once_change_is_violation() {
    let applied = history(vec![success(1, "h1")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "h2", Some(&applied), false),
        Decision::Violation {
            recorded_hash: "h1".to_string()
        }
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "h2", Some(&applied), true),
        Decision::Run(RunReason::ChangedOnceOverride)
    );
}

#[test]
fn test_never_succeeded_retries_freely() {
    let failed = history(vec![failure(1, "h1")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "h2", Some(&failed), false),
        Decision::Run(RunReason::RetryAfterFailure)
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "h1", Some(&failed), false),
        Decision::Run(RunReason::RetryAfterFailure)
    );
}

#[test]
fn test_failed_override_keeps_run_once_check() {
    let rows = history(vec![success(1, "v1"), failure(2, "v2")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "v3", Some(&rows), false),
        Decision::Violation {
            recorded_hash: "v1".to_string()
        }
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "v2", Some(&rows), true),
        Decision::Run(RunReason::ChangedOnceOverride)
    );
}

#[test]
fn test_revert_to_applied_content_is_skipped() {
    let rows = history(vec![success(1, "v1"), failure(2, "v2")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnce, "v1", Some(&rows), false),
        Decision::Skip
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "v1", Some(&rows), false),
        Decision::Skip
    );
}

#[test]
fn test_run_on_change_retries_failed_change() {
    let rows = history(vec![success(1, "v1"), failure(2, "v2")]);
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "v2", Some(&rows), false),
        Decision::Run(RunReason::RetryAfterFailure)
    );
    assert_eq!(
        decide(ExecutionPolicy::RunOnChange, "v3", Some(&rows), false),
        Decision::Run(RunReason::Changed)
    );
    assert_eq!(
        decide(ExecutionPolicy::RunAlways, "v3", Some(&rows), false),
        Decision::Run(RunReason::RetryAfterFailure)
    );
}
