//! SHA-256 checksum utility for script change detection.
//!
//! Script text is normalized before hashing so that the checksum does not
//! depend on the platform a script was edited on: a leading byte-order mark
//! is dropped and every CRLF or lone CR becomes LF.

use sha2::{Digest, Sha256};
use std::borrow::Cow;

/// Normalize line endings to `\n` and strip a leading UTF-8 BOM.
pub fn normalize_script_text(s: &str) -> Cow<'_, str> {
    let s = s.strip_prefix('\u{feff}').unwrap_or(s);
    if !s.contains('\r') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Compute the SHA-256 checksum of a script body, as lowercase hex.
pub fn compute_checksum(s: &str) -> String {
    let normalized = normalize_script_text(s);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
#[path = "checksum_test.rs"]
mod tests;
