//! Restricted glob patterns for artifact matching.
//!
//! Supported syntax:
//! - an optional leading `**/`, meaning "at any depth below the base directory";
//! - a basename where `*` matches any run of characters except `/`.
//!
//! Anything else (`?`, character classes, inner `**`, inner separators) is
//! rejected when the policy is loaded.

use std::path::Path;

use regex::Regex;
use thiserror::Error;

const RECURSIVE_PREFIX: &str = "**/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid artifact pattern `{pattern}`: {reason}")]
pub struct GlobError {
    pub pattern: String,
    pub reason: &'static str,
}

/// A compiled artifact pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    recursive: bool,
    matcher: Regex,
}

impl GlobPattern {
    pub fn parse(raw: &str) -> Result<Self, GlobError> {
        let error = |reason| GlobError {
            pattern: raw.to_string(),
            reason,
        };
        let (recursive, name) = match raw.strip_prefix(RECURSIVE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if name.is_empty() {
            return Err(error("missing file name"));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(error("only a leading `**/` may contain a separator"));
        }
        if name.contains("**") {
            return Err(error("`**` is only allowed as a leading `**/`"));
        }
        if name.contains(['?', '[', ']', '{', '}']) {
            return Err(error("only `*` wildcards are supported"));
        }

        let body = name
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^/]*");
        let matcher = Regex::new(&format!("^{body}$")).map_err(|_| error("does not compile"))?;
        Ok(Self {
            raw: raw.to_string(),
            recursive,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a path relative to the artifact base directory.
    pub fn matches(&self, relative: &Path) -> bool {
        if !self.recursive && relative.components().count() != 1 {
            return false;
        }
        relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.matcher.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(raw: &str) -> GlobPattern {
        GlobPattern::parse(raw).expect("valid pattern")
    }

    #[test]
    fn recursive_prefix_matches_any_depth() {
        let pattern = glob("**/*-PLAN.md");
        assert!(pattern.matches(Path::new("001-fix-login/001-PLAN.md")));
        assert!(pattern.matches(Path::new("x-PLAN.md")));
        assert!(!pattern.matches(Path::new("001-fix-login/001-SUMMARY.md")));
    }

    #[test]
    fn plain_pattern_matches_only_top_level() {
        let pattern = glob("PROJECT.md");
        assert!(pattern.matches(Path::new("PROJECT.md")));
        assert!(!pattern.matches(Path::new("nested/PROJECT.md")));
    }

    #[test]
    fn star_does_not_cross_separators_or_require_characters() {
        let pattern = glob("**/*-PLAN.md");
        assert!(pattern.matches(Path::new("-PLAN.md")));
        assert!(!pattern.matches(Path::new("x-PLAN.md.bak")));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let pattern = glob("**/notes(1).md");
        assert!(pattern.matches(Path::new("a/notes(1).md")));
        assert!(!pattern.matches(Path::new("a/notes1.md")));
    }

    #[test]
    fn unsupported_syntax_is_rejected() {
        for raw in ["", "**/", "a/*.md", "**/a/**/b.md", "*?.md", "[ab].md", "x/**/y"] {
            assert!(GlobPattern::parse(raw).is_err(), "expected rejection of {raw:?}");
        }
    }
}
