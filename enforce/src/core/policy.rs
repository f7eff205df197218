//! Command policy table.
//!
//! Maps each governed command to the rule the dispatcher enforces for it. The
//! built-in table covers the stock `/gsd:*` workflow; projects may replace
//! individual entries via `command_mapping` in `.planning/config.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::command::{canonical_command, is_governed_key};
use crate::core::glob::{GlobError, GlobPattern};

/// Tool the host uses to invoke a delegate.
pub const DELEGATE_TOOL: &str = "Task";
/// Field of the delegate tool input naming the delegate.
pub const DELEGATE_FIELD: &str = "subagent_type";
/// Every artifact base directory must live under this workspace-relative root.
pub const SANDBOX_ROOT: &str = ".planning";

/// Delegate a command must invoke, or a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequiredSubagent {
    /// A specific delegate must be invoked first.
    Named(String),
    /// `none`: no delegate enforcement for this command.
    NoEnforcement,
    /// `other`: delegation is enforced by some other mechanism.
    EnforcedElsewhere,
    /// No rule was known when the turn started (unmapped command).
    #[default]
    Unspecified,
}

impl RequiredSubagent {
    pub fn named(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NoEnforcement => "none",
            Self::EnforcedElsewhere => "other",
            Self::Unspecified => "unspecified",
        }
    }
}

impl From<String> for RequiredSubagent {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "none" => Self::NoEnforcement,
            "other" => Self::EnforcedElsewhere,
            "" | "unspecified" => Self::Unspecified,
            _ => Self::Named(trimmed.to_string()),
        }
    }
}

impl From<RequiredSubagent> for String {
    fn from(value: RequiredSubagent) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RequiredSubagent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files a command must produce under one sandboxed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub base_dir: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_any: Vec<String>,
}

impl ArtifactSpec {
    fn all(base_dir: &str, patterns: &[&str]) -> Self {
        Self {
            base_dir: base_dir.to_string(),
            required_all: patterns.iter().map(|p| p.to_string()).collect(),
            required_any: Vec::new(),
        }
    }

    fn any(base_dir: &str, patterns: &[&str]) -> Self {
        Self {
            base_dir: base_dir.to_string(),
            required_all: Vec::new(),
            required_any: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Compile `required_all` patterns in declaration order.
    pub fn all_patterns(&self) -> Result<Vec<GlobPattern>, GlobError> {
        self.required_all
            .iter()
            .map(|raw| GlobPattern::parse(raw))
            .collect()
    }

    /// Compile `required_any` patterns in declaration order.
    pub fn any_patterns(&self) -> Result<Vec<GlobPattern>, GlobError> {
        self.required_any
            .iter()
            .map(|raw| GlobPattern::parse(raw))
            .collect()
    }
}

/// Enforcement rule for one governed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub required_subagent: RequiredSubagent,
    #[serde(default)]
    pub expected_artifacts: Vec<ArtifactSpec>,
    #[serde(default = "default_allowed_pre_tools")]
    pub allowed_pre_tools: BTreeSet<String>,
}

fn default_allowed_pre_tools() -> BTreeSet<String> {
    BTreeSet::from([DELEGATE_TOOL.to_string()])
}

impl PolicyRule {
    fn delegate(subagent: &str, artifacts: Vec<ArtifactSpec>) -> Self {
        Self {
            required_subagent: RequiredSubagent::Named(subagent.to_string()),
            expected_artifacts: artifacts,
            allowed_pre_tools: default_allowed_pre_tools(),
        }
    }

    fn sentinel(required_subagent: RequiredSubagent, artifacts: Vec<ArtifactSpec>) -> Self {
        Self {
            required_subagent,
            expected_artifacts: artifacts,
            allowed_pre_tools: default_allowed_pre_tools(),
        }
    }

    /// Named delegate this rule enforces, if any.
    pub fn enforced_subagent(&self) -> Option<&str> {
        self.required_subagent.named()
    }

    pub fn allows_before_delegation(&self, tool: &str) -> bool {
        self.allowed_pre_tools.contains(tool)
    }

    /// Semantic checks not covered by the config schema.
    pub fn validate(&self, command: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.required_subagent == RequiredSubagent::Unspecified {
            errors.push(format!(
                "{command}: required_subagent must name a delegate, `none`, or `other`"
            ));
        }
        if self.allowed_pre_tools.is_empty() {
            errors.push(format!("{command}: allowed_pre_tools must not be empty"));
        } else if self.enforced_subagent().is_some() && !self.allows_before_delegation(DELEGATE_TOOL)
        {
            errors.push(format!(
                "{command}: allowed_pre_tools must include {DELEGATE_TOOL} when a subagent is required"
            ));
        }
        for (index, spec) in self.expected_artifacts.iter().enumerate() {
            if spec.required_all.is_empty() && spec.required_any.is_empty() {
                errors.push(format!(
                    "{command}: expected_artifacts[{index}] declares no patterns"
                ));
            }
            for raw in spec.required_all.iter().chain(&spec.required_any) {
                if let Err(err) = GlobPattern::parse(raw) {
                    errors.push(format!("{command}: expected_artifacts[{index}]: {err}"));
                }
            }
        }
        errors
    }
}

/// Immutable command → rule mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PolicyTable {
    rules: BTreeMap<String, PolicyRule>,
}

impl PolicyTable {
    /// Built-in rules for the stock workflow commands.
    pub fn builtin() -> Self {
        let phases = ".planning/phases";
        let rules = [
            (
                "/gsd:quick",
                PolicyRule::delegate(
                    "gsd-planner",
                    vec![ArtifactSpec::all(
                        ".planning/quick",
                        &["**/*-PLAN.md", "**/*-SUMMARY.md"],
                    )],
                ),
            ),
            (
                "/gsd:plan-phase",
                PolicyRule::delegate(
                    "gsd-planner",
                    vec![ArtifactSpec::all(phases, &["**/*-PLAN.md"])],
                ),
            ),
            (
                "/gsd:execute-phase",
                PolicyRule::delegate(
                    "gsd-executor",
                    vec![ArtifactSpec::all(phases, &["**/*-SUMMARY.md"])],
                ),
            ),
            (
                "/gsd:research-phase",
                PolicyRule::delegate(
                    "gsd-phase-researcher",
                    vec![ArtifactSpec::all(phases, &["**/*-RESEARCH.md"])],
                ),
            ),
            (
                "/gsd:verify-work",
                PolicyRule::delegate(
                    "gsd-verifier",
                    vec![ArtifactSpec::any(
                        phases,
                        &["**/*-VERIFICATION.md", "**/*-UAT.md"],
                    )],
                ),
            ),
            (
                "/gsd:map-codebase",
                PolicyRule::delegate(
                    "gsd-codebase-mapper",
                    vec![ArtifactSpec::any(".planning/codebase", &["**/*.md"])],
                ),
            ),
            ("/gsd:debug", PolicyRule::delegate("gsd-debugger", Vec::new())),
            (
                "/gsd:new-project",
                PolicyRule::sentinel(
                    RequiredSubagent::EnforcedElsewhere,
                    vec![ArtifactSpec::all(".planning", &["PROJECT.md"])],
                ),
            ),
            (
                "/gsd:progress",
                PolicyRule::sentinel(RequiredSubagent::NoEnforcement, Vec::new()),
            ),
            (
                "/gsd:help",
                PolicyRule::sentinel(RequiredSubagent::NoEnforcement, Vec::new()),
            ),
        ];
        Self {
            rules: rules
                .into_iter()
                .map(|(command, rule)| (command.to_string(), rule))
                .collect(),
        }
    }

    pub fn get(&self, command: &str) -> Option<&PolicyRule> {
        self.rules.get(command)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return a new table with `overrides` replacing entries per command.
    ///
    /// All overrides are validated first; any invalid entry rejects the whole
    /// set and leaves `self` as the effective table.
    pub fn with_overrides(
        &self,
        overrides: BTreeMap<String, PolicyRule>,
    ) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let mut canonical = BTreeMap::new();
        for (key, rule) in overrides {
            if !is_governed_key(&key) {
                errors.push(format!("{key}: key must look like /gsd:<command>"));
                continue;
            }
            errors.extend(rule.validate(&key));
            canonical.insert(canonical_command(&key), rule);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut rules = self.rules.clone();
        rules.extend(canonical);
        Ok(Self { rules })
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}
