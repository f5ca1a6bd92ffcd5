//! Shared serde helper functions used across configuration types.

/// Serde default function that returns `true`.
pub fn default_true() -> bool {
    true
}
