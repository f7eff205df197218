//! Scrubbing of user-visible reason text.

use std::path::Path;

/// Upper bound on a user-visible message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 600;

const ELLIPSIS: &str = "…";

/// Replaces sensitive path prefixes and bounds message length.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// `(prefix, replacement)`, longest prefix first.
    replacements: Vec<(String, &'static str)>,
    max_chars: usize,
}

impl Redactor {
    pub fn new(home: Option<&Path>, temp: Option<&Path>) -> Self {
        let mut replacements = Vec::new();
        for (path, label) in [(temp, "$TMPDIR"), (home, "~")] {
            let Some(path) = path else { continue };
            let text = path.to_string_lossy();
            let text = text.trim_end_matches(['/', '\\']);
            // Replacing "/" or "" would mangle every path in the message.
            if text.len() > 1 {
                replacements.push((text.to_string(), label));
            }
        }
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            replacements,
            max_chars: MAX_MESSAGE_CHARS,
        }
    }

    pub fn redact(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        for (prefix, label) in &self.replacements {
            scrubbed = scrubbed.replace(prefix.as_str(), label);
        }
        truncate_chars(&scrubbed, self.max_chars)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
