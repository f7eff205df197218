//! Project policy overrides from `.planning/config.json`.
//!
//! The override is optional data: a missing file or missing `command_mapping`
//! means built-in rules, and a malformed override is rejected as a whole (the
//! built-in table stays in effect) with the reason reported on the debug
//! channel only.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::policy::{PolicyRule, PolicyTable};

/// Workspace-relative location of the project config.
pub const PROJECT_CONFIG_PATH: &str = ".planning/config.json";

const COMMAND_MAPPING_SCHEMA: &str = include_str!("../../schemas/command_mapping.schema.json");

/// Where the effective table came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySource {
    Builtin,
    ProjectOverride {
        path: PathBuf,
        commands: Vec<String>,
    },
    RejectedOverride {
        path: PathBuf,
        errors: Vec<String>,
    },
}

/// Immutable policy handed to the dispatcher for one event.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyContext {
    pub source: PolicySource,
    pub table: PolicyTable,
}

impl PolicyContext {
    pub fn builtin() -> Self {
        Self {
            source: PolicySource::Builtin,
            table: PolicyTable::builtin(),
        }
    }

    pub fn rule(&self, command: &str) -> Option<&PolicyRule> {
        self.table.get(command)
    }
}

/// Build the policy for `workspace`: built-ins merged with the project override.
pub fn load_policy(workspace: &Path) -> PolicyContext {
    let path = workspace.join(PROJECT_CONFIG_PATH);
    let overrides = match read_overrides(&path) {
        Ok(Some(overrides)) => overrides,
        Ok(None) => return PolicyContext::builtin(),
        Err(err) => return rejected(path, vec![format!("{err:#}")]),
    };
    let commands: Vec<String> = overrides.keys().cloned().collect();
    match PolicyTable::builtin().with_overrides(overrides) {
        Ok(table) => {
            debug!(path = %path.display(), ?commands, "applied command_mapping override");
            PolicyContext {
                source: PolicySource::ProjectOverride { path, commands },
                table,
            }
        }
        Err(errors) => rejected(path, errors),
    }
}

fn rejected(path: PathBuf, errors: Vec<String>) -> PolicyContext {
    debug!(
        path = %path.display(),
        errors = %errors.join("; "),
        "command_mapping override rejected; using built-in policy"
    );
    PolicyContext {
        source: PolicySource::RejectedOverride { path, errors },
        table: PolicyTable::builtin(),
    }
}

/// Parse `command_mapping` from the config file, if present.
fn read_overrides(path: &Path) -> Result<Option<BTreeMap<String, PolicyRule>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let Some(mapping) = config.get("command_mapping") else {
        return Ok(None);
    };
    validate_schema(mapping)?;
    let overrides =
        serde_json::from_value(mapping.clone()).context("decode command_mapping entries")?;
    Ok(Some(overrides))
}

fn validate_schema(mapping: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(COMMAND_MAPPING_SCHEMA).context("parse command_mapping schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages: Vec<String> = compiled
        .iter_errors(mapping)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!(
            "command_mapping schema validation failed:\n- {}",
            messages.join("\n- ")
        );
    }
    Ok(())
}
