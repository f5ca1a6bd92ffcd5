//! Script units discovered for a migration run.

use crate::error::{CoreError, CoreResult};
use crate::folder::{ExecutionPolicy, RoleName};
use crate::newtype_string::define_newtype_string;
use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use std::path::PathBuf;

fn validate_script_name(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        Err("must not be empty")
    } else if s.contains('\\') {
        Err("must use '/' as the path separator")
    } else {
        Ok(())
    }
}

define_newtype_string! {
    /// Script name recorded in the history: the script's path relative to
    /// the scripts root, with `/` separators (e.g. `up/0001_init.sql`).
    pub struct ScriptName;
    validate = validate_script_name;
}

/// One discovered script for the current run. Never persisted.
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    /// History key for the script
    pub name: ScriptName,

    /// Absolute path on disk
    pub path: PathBuf,

    /// Owning folder role
    pub role: RoleName,

    /// Effective policy (folder policy, or RunAlways for `.everytime.` files)
    pub policy: ExecutionPolicy,

    /// Raw script text (BOM stripped, otherwise untouched)
    pub text: String,

    /// Content checksum of `text`
    pub hash: String,

    /// Position in discovery order within the run
    pub sequence: usize,
}

impl ScriptUnit {
    /// The file name component of the script.
    pub fn file_name(&self) -> &str {
        file_name_of(self.name.as_str())
    }

    /// Whether this is an environment-specific script (`*.env.*`).
    pub fn is_environment_script(&self) -> bool {
        is_environment_file(self.file_name())
    }

    /// Whether the script applies to `environment`.
    ///
    /// Non-environment scripts always apply. An environment script applies
    /// only when one of the dot-separated segments before `.env.` equals the
    /// environment name, ignoring case.
    pub fn runs_in_environment(&self, environment: Option<&str>) -> bool {
        file_runs_in_environment(self.file_name(), environment)
    }
}

pub(crate) fn file_name_of(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn find_marker(file_name: &str, marker: &str) -> Option<usize> {
    file_name.to_ascii_lowercase().find(marker)
}

/// `.everytime.` anywhere in the file name forces RunAlways.
pub fn is_everytime_file(file_name: &str) -> bool {
    find_marker(file_name, ".everytime.").is_some()
}

/// `.env.` anywhere in the file name marks an environment script.
pub fn is_environment_file(file_name: &str) -> bool {
    find_marker(file_name, ".env.").is_some()
}

/// See [`ScriptUnit::runs_in_environment`].
pub fn file_runs_in_environment(file_name: &str, environment: Option<&str>) -> bool {
    let Some(pos) = find_marker(file_name, ".env.") else {
        return true;
    };
    let Some(env) = environment else {
        return false;
    };
    file_name[..pos]
        .split('.')
        .any(|segment| segment.eq_ignore_ascii_case(env))
}

/// Decode raw script bytes into text.
///
/// A UTF-8 or UTF-16 byte-order mark selects that encoding and the bytes must
/// follow it. Unmarked bytes are read as UTF-8 when valid and as Windows-1252
/// otherwise; that mapping is one char per byte, so distinct files never
/// decode to the same text.
pub fn decode_script_bytes(bytes: &[u8], path_for_log: &str) -> CoreResult<String> {
    let (encoding, rest) = match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => (UTF_8, rest),
        [0xFF, 0xFE, rest @ ..] => (UTF_16LE, rest),
        [0xFE, 0xFF, rest @ ..] => (UTF_16BE, rest),
        _ => {
            if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
                return Ok(text.into_owned());
            }
            log::warn!(
                "{} is not valid UTF-8; reading it as {}",
                path_for_log,
                WINDOWS_1252.name()
            );
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            return Ok(text.into_owned());
        }
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(rest)
        .map(|text| text.into_owned())
        .ok_or_else(|| CoreError::ScriptEncoding {
            path: path_for_log.to_string(),
            encoding: encoding.name(),
        })
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
