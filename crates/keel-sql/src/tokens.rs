//! `{{Token}}` placeholder replacement.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Token values keyed by lowercase token name.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    values: HashMap<String, String>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a token. Keys are case-insensitive.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_lowercase(), value.into());
    }

    /// Insert every entry of `tokens`, overwriting existing keys.
    pub fn extend<'a>(&mut self, tokens: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (name, value) in tokens {
            self.insert(name, value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex")
    })
}

/// Replace `{{Name}}` placeholders with values from `tokens`.
///
/// Unknown tokens are left untouched. Text without placeholders is returned
/// borrowed.
pub fn replace_tokens<'a>(text: &'a str, tokens: &TokenMap) -> Cow<'a, str> {
    token_regex().replace_all(text, |caps: &Captures<'_>| match tokens.get(&caps[1]) {
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    })
}

#[cfg(test)]
#[path = "tokens_test.rs"]
mod tests;
