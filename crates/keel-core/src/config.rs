//! Configuration types and parsing for keel.yml

use crate::error::{CoreError, CoreResult};
use crate::folder::{default_folders, known_role, ExecutionPolicy, MigrationsFolder, RoleName};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no `--target` flag is given.
pub const TARGET_ENV_VAR: &str = "KEEL_TARGET";

/// Main project configuration from keel.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directory holding the migrations folders, relative to the project
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,

    /// Target database connection
    pub database: DatabaseConfig,

    /// Migrations folders in execution order. Defaults to the built-in roles.
    #[serde(default)]
    pub folders: Option<Vec<FolderConfig>>,

    /// Per-role policy overrides applied on top of `folders`
    #[serde(default)]
    pub policies: HashMap<String, ExecutionPolicy>,

    /// Transaction scope for script execution
    #[serde(default)]
    pub transaction: TransactionMode,

    /// Create the target database when it does not exist
    #[serde(default = "default_true")]
    pub create_database: bool,

    /// Decide run/skip for every script without executing anything
    #[serde(default)]
    pub dry_run: bool,

    /// Environment name used to select `.env.` scripts
    #[serde(default)]
    pub environment: Option<String>,

    /// `{{Token}}` replacements applied to script text before execution
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    /// Location of the history table
    #[serde(default)]
    pub history: HistoryConfig,

    /// Named target configurations (e.g., dev, staging, prod)
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Environment override
    #[serde(default)]
    pub environment: Option<String>,

    /// Token overrides (merged with base tokens)
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

/// Database engine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// Microsoft SQL Server
    #[serde(alias = "mssql")]
    SqlServer,
    /// PostgreSQL
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL or MariaDB
    #[serde(alias = "mariadb")]
    MySql,
    /// Oracle
    Oracle,
    /// SQLite (file per database)
    Sqlite,
    /// DuckDB (file per database)
    DuckDb,
}

impl DbType {
    /// Whether each database is a file on the local filesystem.
    pub fn is_file_based(&self) -> bool {
        matches!(self, DbType::Sqlite | DbType::DuckDb)
    }

    /// Default TCP port for server engines.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbType::SqlServer => Some(1433),
            DbType::Postgres => Some(5432),
            DbType::MySql => Some(3306),
            DbType::Oracle => Some(1521),
            DbType::Sqlite | DbType::DuckDb => None,
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::SqlServer => write!(f, "sqlserver"),
            DbType::Postgres => write!(f, "postgres"),
            DbType::MySql => write!(f, "mysql"),
            DbType::Oracle => write!(f, "oracle"),
            DbType::Sqlite => write!(f, "sqlite"),
            DbType::DuckDb => write!(f, "duckdb"),
        }
    }
}

impl std::str::FromStr for DbType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(DbType::SqlServer),
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "mysql" | "mariadb" => Ok(DbType::MySql),
            "oracle" => Ok(DbType::Oracle),
            "sqlite" => Ok(DbType::Sqlite),
            "duckdb" => Ok(DbType::DuckDb),
            other => Err(CoreError::ConfigInvalid {
                message: format!("Unknown database type '{}'", other),
            }),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database engine
    #[serde(rename = "type")]
    pub db_type: DbType,

    /// Target database name. For file engines, the file stem (or `:memory:`).
    pub name: String,

    /// Server host name (server engines)
    #[serde(default)]
    pub host: Option<String>,

    /// Server port; defaults per engine
    #[serde(default)]
    pub port: Option<u16>,

    /// Login user name
    #[serde(default)]
    pub username: Option<String>,

    /// Login password, or `env:VAR` to read it from the environment
    #[serde(default)]
    pub password: Option<String>,

    /// Database to connect to for catalog queries and CREATE DATABASE
    #[serde(default)]
    pub admin_database: Option<String>,

    /// Directory holding database files (file engines)
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Raw driver connection string; overrides host/port/credentials
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl DatabaseConfig {
    /// Config for a file-based engine in `directory`.
    pub fn file(db_type: DbType, directory: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            db_type,
            name: name.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            admin_database: None,
            directory: directory.into(),
            connection_string: None,
        }
    }

    /// Host, defaulting to `localhost`.
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Port, defaulting to the engine's standard port.
    pub fn port_or_default(&self) -> u16 {
        self.port.or(self.db_type.default_port()).unwrap_or(0)
    }

    /// Resolve the password, reading `env:VAR` references from the environment.
    pub fn resolved_password(&self) -> CoreResult<Option<String>> {
        match self.password.as_deref() {
            Some(p) => match p.strip_prefix("env:") {
                Some(var) => std::env::var(var)
                    .map(Some)
                    .map_err(|_| CoreError::EnvVarMissing {
                        name: var.to_string(),
                    }),
                None => Ok(Some(p.to_string())),
            },
            None => Ok(None),
        }
    }

    /// Server name used for display and the `{{ServerName}}` token.
    pub fn server_label(&self) -> String {
        if self.db_type.is_file_based() {
            self.directory.clone()
        } else {
            format!("{}:{}", self.host_or_default(), self.port_or_default())
        }
    }
}

/// One entry of the `folders` list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderConfig {
    /// Role name; built-in roles supply defaults for the other fields
    pub role: RoleName,

    /// Folder path relative to `scripts_dir` (defaults to the role's path)
    #[serde(default)]
    pub path: Option<String>,

    /// Execution policy (required for custom roles)
    #[serde(default)]
    pub policy: Option<ExecutionPolicy>,

    /// Fail discovery when the folder does not exist
    #[serde(default)]
    pub required: bool,

    /// Only run when the database was created by the current run
    #[serde(default)]
    pub only_after_create: Option<bool>,
}

/// Transaction scope for script execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// One transaction per script (default)
    #[default]
    PerScript,
    /// One transaction spanning the whole run
    WholeRun,
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::PerScript => write!(f, "per_script"),
            TransactionMode::WholeRun => write!(f, "whole_run"),
        }
    }
}

/// Location of the history table inside the target database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Schema name (or table prefix on engines without schemas)
    #[serde(default = "default_history_schema")]
    pub schema: String,

    /// Table name
    #[serde(default = "default_history_table")]
    pub table: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            schema: default_history_schema(),
            table: default_history_table(),
        }
    }
}

fn default_scripts_dir() -> String {
    "db".to_string()
}

fn default_directory() -> String {
    ".".to_string()
}

fn default_history_schema() -> String {
    "keel".to_string()
}

fn default_history_table() -> String {
    "script_run".to_string()
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for keel.yml or keel.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("keel.yml");
        let yaml_path = dir.join("keel.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.database.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.name cannot be empty".to_string(),
            });
        }

        for (label, value) in [
            ("history.schema", &self.history.schema),
            ("history.table", &self.history.table),
        ] {
            if !is_plain_identifier(value) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "{} must be a plain identifier (letters, digits, underscore), got '{}'",
                        label, value
                    ),
                });
            }
        }

        if let Some(folders) = &self.folders {
            if folders.is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: "folders must list at least one folder when specified".to_string(),
                });
            }
            let mut seen = HashSet::new();
            for folder in folders {
                if !seen.insert(folder.role.as_str()) {
                    return Err(CoreError::ConfigInvalid {
                        message: format!("Duplicate folder role '{}'", folder.role),
                    });
                }
                if folder.policy.is_none()
                    && known_role(&folder.role).is_none()
                    && !self.policies.contains_key(folder.role.as_str())
                {
                    return Err(CoreError::ConfigInvalid {
                        message: format!(
                            "Folder role '{}' is not a built-in role and needs an explicit policy",
                            folder.role
                        ),
                    });
                }
            }
        }

        let roles = self.migrations_folders();
        for role in self.policies.keys() {
            if !roles.iter().any(|f| f.role == role.as_str()) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "Unknown role '{}' in policies. Configured roles: {}",
                        role,
                        roles
                            .iter()
                            .map(|f| f.role.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    /// Resolve the configured folders into their execution order.
    ///
    /// Precedence is the position in `folders` (or in the built-in role list
    /// when `folders` is omitted). Policy overrides are applied last.
    pub fn migrations_folders(&self) -> Vec<MigrationsFolder> {
        let mut folders = match &self.folders {
            None => default_folders(),
            Some(configured) => configured
                .iter()
                .enumerate()
                .map(|(precedence, fc)| {
                    let known = known_role(&fc.role);
                    MigrationsFolder {
                        role: fc.role.clone(),
                        path: PathBuf::from(
                            fc.path
                                .clone()
                                .or_else(|| known.map(|k| k.path.to_string()))
                                .unwrap_or_else(|| fc.role.to_string()),
                        ),
                        policy: fc
                            .policy
                            .or(known.map(|k| k.policy))
                            .unwrap_or(ExecutionPolicy::RunOnce),
                        required: fc.required,
                        only_after_create: fc
                            .only_after_create
                            .or(known.map(|k| k.only_after_create))
                            .unwrap_or(false),
                        precedence,
                    }
                })
                .collect(),
        };

        for folder in &mut folders {
            if let Some(policy) = self.policies.get(folder.role.as_str()) {
                folder.policy = *policy;
            }
        }
        folders
    }

    /// Get the absolute scripts root relative to a project root
    pub fn scripts_dir_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.scripts_dir)
    }

    /// Get the list of available target names
    pub fn available_targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn target_config(&self, target: Option<&str>) -> CoreResult<Option<&TargetConfig>> {
        match target {
            Some(name) => self
                .targets
                .get(name)
                .map(Some)
                .ok_or_else(|| CoreError::ConfigInvalid {
                    message: format!(
                        "Target '{}' not found. Available targets: {}",
                        name,
                        self.available_targets().join(", ")
                    ),
                }),
            None => Ok(None),
        }
    }

    /// Get database configuration, optionally applying target overrides
    pub fn get_database_config(&self, target: Option<&str>) -> CoreResult<DatabaseConfig> {
        Ok(self
            .target_config(target)?
            .and_then(|tc| tc.database.clone())
            .unwrap_or_else(|| self.database.clone()))
    }

    /// Get the environment name, optionally applying target overrides
    pub fn get_environment(&self, target: Option<&str>) -> CoreResult<Option<String>> {
        Ok(self
            .target_config(target)?
            .and_then(|tc| tc.environment.clone())
            .or_else(|| self.environment.clone()))
    }

    /// Get merged tokens, with target overrides taking precedence.
    pub fn get_merged_tokens(
        &self,
        target: Option<&str>,
    ) -> CoreResult<Cow<'_, HashMap<String, String>>> {
        match self.target_config(target)?.filter(|tc| !tc.tokens.is_empty()) {
            Some(tc) => {
                let mut tokens = self.tokens.clone();
                for (key, value) in &tc.tokens {
                    tokens.insert(key.clone(), value.clone());
                }
                Ok(Cow::Owned(tokens))
            }
            None => Ok(Cow::Borrowed(&self.tokens)),
        }
    }

    /// Resolve target from CLI flag or KEEL_TARGET environment variable
    ///
    /// Priority: CLI flag > KEEL_TARGET env var > None
    pub fn resolve_target(cli_target: Option<&str>) -> Option<String> {
        cli_target
            .map(String::from)
            .or_else(|| std::env::var(TARGET_ENV_VAR).ok())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
