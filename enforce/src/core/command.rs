//! Governed command detection.
//!
//! A governed command is a `/gsd:<token>` reference in free-form user text. The
//! first reference wins and is returned lowercase so that policy lookups are
//! case-insensitive.

use std::sync::LazyLock;

use regex::Regex;

/// Namespace shared by every governed command.
pub const COMMAND_NAMESPACE: &str = "gsd";

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)/{COMMAND_NAMESPACE}:[a-z0-9_-]+"))
        .expect("command pattern is valid")
});

static COMMAND_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^/{COMMAND_NAMESPACE}:[a-z0-9_-]+$"))
        .expect("command key pattern is valid")
});

/// Return the first governed command in `text`, lowercased.
pub fn detect_command(text: &str) -> Option<String> {
    COMMAND_RE
        .find(text)
        .map(|found| found.as_str().to_ascii_lowercase())
}

/// True if `key` is exactly one governed command token (used for policy keys).
pub fn is_governed_key(key: &str) -> bool {
    COMMAND_KEY_RE.is_match(key)
}

/// Canonical form of a policy key or detected command.
pub fn canonical_command(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
