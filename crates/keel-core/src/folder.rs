//! Migrations folder roles and execution policies.
//!
//! A migration project is a set of folders, each playing a role (`up`,
//! `views`, `permissions`, ...). Roles run in a fixed precedence order and
//! each role carries an [`ExecutionPolicy`] that decides whether a script
//! re-runs on later migrations.

use crate::newtype_string::define_newtype_string;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn validate_role(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        Err("must not be empty")
    } else if s.chars().any(char::is_whitespace) {
        Err("must not contain whitespace")
    } else {
        Ok(())
    }
}

define_newtype_string! {
    /// Name of a migrations folder role (e.g. `up`, `permissions`).
    pub struct RoleName;
    validate = validate_role;
}

/// Whether a script re-executes on subsequent migration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Run the first time the script is seen. A later content change is a
    /// policy violation.
    RunOnce,
    /// Run whenever the content hash differs from the latest recorded run.
    RunOnChange,
    /// Run on every migration.
    RunAlways,
}

impl std::fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPolicy::RunOnce => write!(f, "run_once"),
            ExecutionPolicy::RunOnChange => write!(f, "run_on_change"),
            ExecutionPolicy::RunAlways => write!(f, "run_always"),
        }
    }
}

/// A resolved migrations folder: role, location, policy and precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationsFolder {
    /// Role name, unique within a project
    pub role: RoleName,

    /// Folder path relative to the scripts root
    pub path: PathBuf,

    /// Execution policy applied to every script in the folder
    pub policy: ExecutionPolicy,

    /// A missing required folder aborts discovery
    pub required: bool,

    /// Only run when the target database was created by the current run
    pub only_after_create: bool,

    /// Position in the execution order (0 runs first)
    pub precedence: usize,
}

/// Built-in role definition used for defaults.
#[derive(Debug, Clone, Copy)]
pub struct KnownRole {
    /// Role name as written in `keel.yml`
    pub name: &'static str,
    /// Default folder path
    pub path: &'static str,
    /// Default policy
    pub policy: ExecutionPolicy,
    /// Default for [`MigrationsFolder::only_after_create`]
    pub only_after_create: bool,
}

/// The default folder roles, in execution order.
pub const DEFAULT_ROLES: &[KnownRole] = &[
    KnownRole {
        name: "alter_database",
        path: "alterDatabase",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "run_after_create_database",
        path: "runAfterCreateDatabase",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: true,
    },
    KnownRole {
        name: "run_before_up",
        path: "runBeforeUp",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "up",
        path: "up",
        policy: ExecutionPolicy::RunOnce,
        only_after_create: false,
    },
    KnownRole {
        name: "run_first_after_up",
        path: "runFirstAfterUp",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "functions",
        path: "functions",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "views",
        path: "views",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "sprocs",
        path: "sprocs",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "triggers",
        path: "triggers",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "indexes",
        path: "indexes",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "run_after_other_any_time_scripts",
        path: "runAfterOtherAnyTimeScripts",
        policy: ExecutionPolicy::RunOnChange,
        only_after_create: false,
    },
    KnownRole {
        name: "permissions",
        path: "permissions",
        policy: ExecutionPolicy::RunAlways,
        only_after_create: false,
    },
];

/// Look up a built-in role by name.
pub fn known_role(name: &str) -> Option<&'static KnownRole> {
    DEFAULT_ROLES.iter().find(|r| r.name == name)
}

/// The default folder list, all optional, in precedence order.
pub fn default_folders() -> Vec<MigrationsFolder> {
    DEFAULT_ROLES
        .iter()
        .enumerate()
        .map(|(precedence, role)| MigrationsFolder {
            role: RoleName::new(role.name),
            path: PathBuf::from(role.path),
            policy: role.policy,
            required: false,
            only_after_create: role.only_after_create,
            precedence,
        })
        .collect()
}

#[cfg(test)]
#[path = "folder_test.rs"]
mod tests;
