//! Error types for keel-core

use thiserror::Error;

/// Core error type for Keel
#[derive(Error, Debug)]
pub enum CoreError {
    /// K001: Configuration file not found
    #[error("[K001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// K002: Invalid configuration value
    #[error("[K002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// K003: Project directory not found
    #[error("[K003] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// K004: A folder marked as required does not exist
    #[error("[K004] Required migrations folder '{role}' not found at {path}")]
    FolderNotFound { role: String, path: String },

    /// K005: A migrations folder exists but cannot be enumerated
    #[error("[K005] Cannot read migrations folder '{role}' at {path}: {source}")]
    FolderUnreadable {
        role: String,
        path: String,
        source: std::io::Error,
    },

    /// K006: A script file cannot be read
    #[error("[K006] Cannot read script '{path}': {source}")]
    ScriptUnreadable {
        path: String,
        source: std::io::Error,
    },

    /// K007: A stored timestamp could not be parsed
    #[error("[K007] Invalid timestamp '{value}' in history")]
    InvalidTimestamp { value: String },

    /// K008: Unknown outcome value in history
    #[error("[K008] Invalid run outcome '{value}' in history")]
    InvalidOutcome { value: String },

    /// K009: A referenced environment variable is not set
    #[error("[K009] Environment variable '{name}' referenced by config is not set")]
    EnvVarMissing { name: String },

    /// K010: IO error
    #[error("[K010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// K011: IO error with file path context
    #[error("[K011] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// K012: YAML parse error
    #[error("[K012] Failed to parse config: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// K013: A script declares an encoding its bytes do not follow
    #[error("[K013] Script '{path}' is not valid {encoding}")]
    ScriptEncoding { path: String, encoding: &'static str },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
