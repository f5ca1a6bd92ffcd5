//! Run/skip decisions from execution policy and history.

use keel_core::{ExecutionPolicy, ScriptHistory};

/// Why a script is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    /// No history row for the script
    New,
    /// RunOnChange script whose hash differs from the last success
    Changed,
    /// RunAlways script
    Always,
    /// Latest row is a failure of the same content, or nothing succeeded yet
    RetryAfterFailure,
    /// RunOnce script changed, re-run explicitly allowed
    ChangedOnceOverride,
}

impl std::fmt::Display for RunReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunReason::New => "new",
            RunReason::Changed => "changed",
            RunReason::Always => "always",
            RunReason::RetryAfterFailure => "previous run failed",
            RunReason::ChangedOnceOverride => "changed run-once script, override",
        };
        f.write_str(s)
    }
}

/// Outcome of consulting the policy for one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run(RunReason),
    Skip,
    /// RunOnce content changed since it was applied
    Violation { recorded_hash: String },
}

/// Decide what to do with a script given its recorded history.
///
/// Hashes are compared against the last successful run. A failed attempt was
/// rolled back, so it neither counts as applied content nor lifts the
/// run-once check; only a script that never succeeded is retried freely.
pub fn decide(
    policy: ExecutionPolicy,
    current_hash: &str,
    history: Option<&ScriptHistory>,
    rerun_changed_once: bool,
) -> Decision {
    let Some(history) = history else {
        return Decision::Run(RunReason::New);
    };
    let retrying = !history.latest.is_success();
    if policy == ExecutionPolicy::RunAlways {
        return Decision::Run(if retrying {
            RunReason::RetryAfterFailure
        } else {
            RunReason::Always
        });
    }

    let Some(applied_hash) = history.applied_hash() else {
        return Decision::Run(RunReason::RetryAfterFailure);
    };
    if applied_hash == current_hash {
        return Decision::Skip;
    }

    match policy {
        ExecutionPolicy::RunOnce if !rerun_changed_once => Decision::Violation {
            recorded_hash: applied_hash.to_string(),
        },
        ExecutionPolicy::RunOnce => Decision::Run(RunReason::ChangedOnceOverride),
        _ if retrying && history.latest.content_hash == current_hash => {
            Decision::Run(RunReason::RetryAfterFailure)
        }
        _ => Decision::Run(RunReason::Changed),
    }
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
